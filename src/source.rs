use parking_lot::Mutex;
use tokio::time::Instant;

use frame_protocol::PlaybackPosition;

use crate::error::{AnalysisError, Result};

/// A raw frame snapshot (packed RGB24).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data (RGB).
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Frame {
    /// Wrap an RGB buffer, checking that it matches the given dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(AnalysisError::Sample(format!(
                "buffer of {} bytes does not match {width}x{height} RGB",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }
}

/// The playing video the pipeline reads from.
///
/// Playback itself (play/pause/seek) is driven elsewhere; the pipeline only
/// reads the live position and state and takes snapshots on demand.
pub trait FrameSource: Send + Sync {
    /// Current playback position.
    fn current_position(&self) -> PlaybackPosition;

    /// Whether playback is paused or has reached the end.
    fn is_paused_or_ended(&self) -> bool;

    /// Synchronous snapshot of the frame currently displayed.
    fn sample_frame(&self) -> Result<Frame>;
}

struct Playback {
    /// Position accumulated before the current playing stretch.
    baseline_secs: f64,
    /// Set while playing; combines with `baseline_secs` for the live position.
    running_anchor: Option<Instant>,
}

/// A simulated video player producing generated frames.
///
/// Position advances with the Tokio clock while playing, so tests running
/// with a paused clock control it exactly. Positions are quantised to frame
/// boundaries the way a decoder reports the presented frame's timestamp.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: f64,
    duration_secs: f64,
    playback: Mutex<Playback>,
}

impl SyntheticSource {
    /// Create a paused player at position zero.
    pub fn new(width: u32, height: u32, fps: f64, duration_secs: f64) -> Self {
        Self {
            width,
            height,
            fps: if fps > 0.0 { fps } else { 30.0 },
            duration_secs: duration_secs.max(0.0),
            playback: Mutex::new(Playback {
                baseline_secs: 0.0,
                running_anchor: None,
            }),
        }
    }

    pub fn play(&self) {
        let mut pb = self.playback.lock();
        if pb.running_anchor.is_none() {
            pb.running_anchor = Some(Instant::now());
        }
    }

    pub fn pause(&self) {
        let mut pb = self.playback.lock();
        pb.baseline_secs = self.raw_position(&pb);
        pb.running_anchor = None;
    }

    /// Jump to `secs`, keeping the play/pause state.
    pub fn seek(&self, secs: f64) {
        let mut pb = self.playback.lock();
        pb.baseline_secs = secs.clamp(0.0, self.duration_secs);
        if pb.running_anchor.is_some() {
            pb.running_anchor = Some(Instant::now());
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn raw_position(&self, pb: &Playback) -> f64 {
        let elapsed = pb
            .running_anchor
            .map(|anchor| anchor.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (pb.baseline_secs + elapsed).min(self.duration_secs)
    }

    fn frame_index(&self, secs: f64) -> u64 {
        (secs * self.fps).floor() as u64
    }
}

impl FrameSource for SyntheticSource {
    fn current_position(&self) -> PlaybackPosition {
        let pb = self.playback.lock();
        let index = self.frame_index(self.raw_position(&pb));
        PlaybackPosition::from_secs(index as f64 / self.fps)
    }

    fn is_paused_or_ended(&self) -> bool {
        let pb = self.playback.lock();
        pb.running_anchor.is_none() || self.raw_position(&pb) >= self.duration_secs
    }

    fn sample_frame(&self) -> Result<Frame> {
        let index = {
            let pb = self.playback.lock();
            self.frame_index(self.raw_position(&pb))
        };
        let shift = (index % 256) as u32;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8); // R
                data.push((y % 256) as u8); // G
                data.push((shift * 3 % 256) as u8); // B
            }
        }
        Frame::new(data, self.width, self.height)
    }
}
