//! Realtime deepfake analysis of a playing video.
//!
//! A capture loop samples the player at a bounded rate and hands encoded
//! frames to an inference worker; results come back through a single handler
//! that only applies those still matching the active session and the live
//! playback position.

pub mod capture;
pub mod compress;
pub mod controller;
pub mod reconcile;
pub mod session;
pub mod worker;

pub use controller::{AnalysisController, ErrorCallback, FailureReport};
pub use reconcile::{Reconciliation, VisibleState};
pub use session::Session;
