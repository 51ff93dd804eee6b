use serde::Serialize;
use std::time::Instant;

/// Collects counters for one analysis pipeline.
pub struct PipelineStats {
    tick_count: u64,
    skipped_ticks: u64,
    frames_submitted: u64,
    frames_dropped: u64,
    bytes_submitted: u64,
    results_applied: u64,
    results_failed: u64,
    stale_session: u64,
    stale_position: u64,
    start_time: Instant,
}

/// Snapshot of pipeline stats for serialisation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub tick_count: u64,
    pub skipped_ticks: u64,
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub results_applied: u64,
    pub results_failed: u64,
    pub stale_session: u64,
    pub stale_position: u64,
    pub sample_rate: f64,
    pub discard_rate: f64,
    pub bandwidth_bps: u64,
}

impl PipelineStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            tick_count: 0,
            skipped_ticks: 0,
            frames_submitted: 0,
            frames_dropped: 0,
            bytes_submitted: 0,
            results_applied: 0,
            results_failed: 0,
            stale_session: 0,
            stale_position: 0,
            start_time: Instant::now(),
        }
    }

    /// Record a scheduling tick of the capture loop.
    pub fn record_tick(&mut self) {
        self.tick_count += 1;
    }

    /// Record a tick that arrived before the sampling interval elapsed.
    pub fn record_skip(&mut self) {
        self.skipped_ticks += 1;
    }

    /// Record a frame handed to the inference worker.
    pub fn record_submit(&mut self, bytes: usize) {
        self.frames_submitted += 1;
        self.bytes_submitted += bytes as u64;
    }

    /// Record a sampled frame that never reached the worker.
    pub fn record_drop(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn record_applied(&mut self) {
        self.results_applied += 1;
    }

    pub fn record_failed(&mut self) {
        self.results_failed += 1;
    }

    pub fn record_stale_session(&mut self) {
        self.stale_session += 1;
    }

    pub fn record_stale_position(&mut self) {
        self.stale_position += 1;
    }

    /// Submitted frames per second since the stats were created.
    pub fn sample_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frames_submitted as f64 / elapsed
    }

    /// Share of received results discarded as stale, as a percentage.
    pub fn discard_rate(&self) -> f64 {
        let discarded = self.stale_session + self.stale_position;
        let total = discarded + self.results_applied + self.results_failed;
        if total == 0 {
            return 0.0;
        }
        (discarded as f64 / total as f64) * 100.0
    }

    /// Upload bandwidth in bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.bytes_submitted as f64 / elapsed) as u64
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            tick_count: self.tick_count,
            skipped_ticks: self.skipped_ticks,
            frames_submitted: self.frames_submitted,
            frames_dropped: self.frames_dropped,
            results_applied: self.results_applied,
            results_failed: self.results_failed,
            stale_session: self.stale_session,
            stale_position: self.stale_position,
            sample_rate: self.sample_rate(),
            discard_rate: self.discard_rate(),
            bandwidth_bps: self.bandwidth_bps(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn initialises_with_zero_values() {
        let stats = PipelineStats::new();
        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.frames_submitted, 0);
        assert_eq!(stats.bytes_submitted, 0);
        assert_eq!(stats.results_applied, 0);
    }

    #[test]
    fn record_submit_tracks_frames_and_bytes() {
        let mut stats = PipelineStats::new();
        stats.record_submit(1000);
        stats.record_submit(500);
        assert_eq!(stats.frames_submitted, 2);
        assert_eq!(stats.bytes_submitted, 1500);
    }

    #[test]
    fn discard_rate_returns_percentage() {
        let mut stats = PipelineStats::new();
        stats.record_applied();
        stats.record_failed();
        stats.record_stale_session();
        stats.record_stale_position();
        // 2 discards out of 4 results = 50%
        let rate = stats.discard_rate();
        assert!((rate - 50.0).abs() < 0.001, "discard rate should be 50%, got {rate}");
    }

    #[test]
    fn discard_rate_zero_when_no_results() {
        let stats = PipelineStats::new();
        assert_eq!(stats.discard_rate(), 0.0);
    }

    #[test]
    fn bandwidth_bps_tracks_bytes() {
        let mut stats = PipelineStats::new();
        stats.record_submit(10_000);
        thread::sleep(Duration::from_millis(50));
        let bps = stats.bandwidth_bps();
        assert!(bps > 0, "bandwidth should be positive, got {bps}");
    }

    #[test]
    fn sample_rate_is_positive_after_submissions() {
        let mut stats = PipelineStats::new();
        for _ in 0..5 {
            stats.record_submit(100);
        }
        thread::sleep(Duration::from_millis(20));
        let rate = stats.sample_rate();
        assert!(rate > 0.0, "sample rate should be positive, got {rate}");
    }

    #[test]
    fn reset_clears_all_counters() {
        let mut stats = PipelineStats::new();
        stats.record_tick();
        stats.record_skip();
        stats.record_drop();
        stats.record_applied();
        stats.reset();
        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.skipped_ticks, 0);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.results_applied, 0);
    }

    #[test]
    fn snapshot_serialises_to_camelcase() {
        let mut stats = PipelineStats::new();
        stats.record_stale_position();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["stalePosition"], 1);
        assert!(json["framesSubmitted"].is_number());
        assert!(json["discardRate"].is_number());
    }
}
