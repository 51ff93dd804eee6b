//! Realtime deepfake probability estimation for a playing video.

pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod source;

pub use analysis::{AnalysisController, ErrorCallback, FailureReport, Session, VisibleState};
pub use config::PipelineConfig;
pub use error::{AnalysisError, Result};
pub use frame_protocol::{PlaybackPosition, SessionId};
pub use source::{Frame, FrameSource, SyntheticSource};
