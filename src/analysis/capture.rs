use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use frame_protocol::{FrameJob, PlaybackPosition, WorkerRequest};

use super::compress::FrameEncoder;
use super::session::Session;
use crate::config::PipelineConfig;
use crate::diagnostics::stats::PipelineStats;
use crate::source::FrameSource;

/// Admits at most one sample per interval, whatever the tick rate.
///
/// A tick that arrives too soon is refused outright; nothing is queued.
#[derive(Debug, Clone)]
pub struct SampleGate {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl SampleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Accept a sample at `now` if a full interval has passed since the last
    /// accepted one. The first call always accepts.
    pub fn try_accept(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

/// Why a capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The player paused or reached the end.
    SourcePaused,
    /// The session was invalidated from outside.
    Stopped,
    /// The worker's inbox is closed.
    WorkerGone,
}

/// Why a sampled frame was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    SampleFailed,
    EncodeFailed,
    /// The worker inbox is full.
    WorkerBusy,
}

/// Result of one scheduling tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped,
    Submitted {
        captured_at: PlaybackPosition,
        bytes: usize,
    },
    Dropped(DropReason),
    Terminated(Termination),
}

/// Samples the frame source for one session and hands encoded frames to the
/// inference worker.
pub struct CaptureLoop {
    session: Session,
    source: Arc<dyn FrameSource>,
    jobs: mpsc::Sender<WorkerRequest>,
    endpoint: String,
    encoder: FrameEncoder,
    gate: SampleGate,
    stats: Arc<Mutex<PipelineStats>>,
}

impl CaptureLoop {
    pub fn new(
        session: Session,
        source: Arc<dyn FrameSource>,
        jobs: mpsc::Sender<WorkerRequest>,
        stats: Arc<Mutex<PipelineStats>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            session,
            source,
            jobs,
            endpoint: config.frame_endpoint(),
            encoder: FrameEncoder::new(config.jpeg_quality, config.downscale_divisor),
            gate: SampleGate::new(config.sample_interval()),
            stats,
        }
    }

    /// Drive the loop until it terminates, one tick per `tick_interval`.
    ///
    /// Ticks missed while encoding are skipped, never replayed. On exit the
    /// session is invalidated so late results for it are discarded.
    pub async fn run(mut self, tick_interval: Duration) -> Termination {
        let session_id = self.session.id();
        info!("capture loop starting for {session_id}");

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            let now = ticker.tick().await;
            if let TickOutcome::Terminated(reason) = self.tick(now).await {
                break reason;
            }
        };

        self.session.invalidate();
        info!("capture loop exiting for {session_id}: {reason:?}");
        reason
    }

    /// Run one scheduling tick at `now`.
    ///
    /// Termination is checked before anything is sampled, and the session is
    /// checked again after encoding so a stop that lands mid-encode prevents
    /// submission.
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        self.stats.lock().record_tick();

        if let Some(reason) = self.termination() {
            return TickOutcome::Terminated(reason);
        }
        if !self.gate.try_accept(now) {
            self.stats.lock().record_skip();
            return TickOutcome::Skipped;
        }

        let captured_at = self.source.current_position();
        let frame = match self.source.sample_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame sample at {captured_at} failed: {e}");
                return self.dropped(DropReason::SampleFailed);
            }
        };

        let encoder = self.encoder;
        let payload = match tokio::task::spawn_blocking(move || encoder.encode(&frame)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!("frame encode at {captured_at} failed: {e}");
                return self.dropped(DropReason::EncodeFailed);
            }
            Err(e) => {
                warn!("frame encode task at {captured_at} failed: {e}");
                return self.dropped(DropReason::EncodeFailed);
            }
        };

        if !self.session.is_active() {
            return TickOutcome::Terminated(Termination::Stopped);
        }

        let bytes = payload.len();
        let job = FrameJob {
            session_id: self.session.id(),
            captured_at,
            payload,
        };
        match self.jobs.try_send(job.into_request(self.endpoint.as_str())) {
            Ok(()) => {
                self.stats.lock().record_submit(bytes);
                TickOutcome::Submitted { captured_at, bytes }
            }
            Err(TrySendError::Full(_)) => {
                debug!("worker inbox full, dropping frame at {captured_at}");
                self.dropped(DropReason::WorkerBusy)
            }
            Err(TrySendError::Closed(_)) => TickOutcome::Terminated(Termination::WorkerGone),
        }
    }

    fn termination(&self) -> Option<Termination> {
        if !self.session.is_active() {
            Some(Termination::Stopped)
        } else if self.source.is_paused_or_ended() {
            Some(Termination::SourcePaused)
        } else {
            None
        }
    }

    fn dropped(&self, reason: DropReason) -> TickOutcome {
        self.stats.lock().record_drop();
        TickOutcome::Dropped(reason)
    }
}
