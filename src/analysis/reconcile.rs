use serde::Serialize;

use frame_protocol::{InferenceOutcome, InferenceResult, PlaybackPosition, SessionId};

/// The single currently displayed estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleState {
    /// Deepfake probability in percent.
    pub probability: f64,
    /// Playback position of the frame the probability was computed for.
    pub last_updated_at: Option<PlaybackPosition>,
}

impl VisibleState {
    pub const NEUTRAL_PROBABILITY: f64 = 0.0;

    /// The value shown before any result for the loaded video arrives.
    pub fn neutral() -> Self {
        Self {
            probability: Self::NEUTRAL_PROBABILITY,
            last_updated_at: None,
        }
    }
}

impl Default for VisibleState {
    fn default() -> Self {
        Self::neutral()
    }
}

/// What happened to one inference result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The probability became the visible estimate.
    Applied { probability: f64 },
    /// Current result, but the call failed. Visible state is untouched.
    Failed { message: String },
    /// Belongs to a session that is no longer active (or none is).
    StaleSession,
    /// Active session, but the player has moved past the sampled frame.
    StalePosition,
}

impl Reconciliation {
    pub fn is_discard(&self) -> bool {
        matches!(self, Self::StaleSession | Self::StalePosition)
    }
}

/// Apply `result` to `state` if it is still current.
///
/// The caller must read `active` and `now` and call this inside one critical
/// section so the checks and the write are atomic. Positions are compared
/// with exact equality, not a tolerance window.
pub fn reconcile(
    state: &mut VisibleState,
    active: Option<SessionId>,
    now: PlaybackPosition,
    result: &InferenceResult,
) -> Reconciliation {
    if active != Some(result.session_id) {
        return Reconciliation::StaleSession;
    }
    if result.captured_at != now {
        return Reconciliation::StalePosition;
    }
    match &result.outcome {
        InferenceOutcome::Success { probability } => {
            state.probability = *probability;
            state.last_updated_at = Some(result.captured_at);
            Reconciliation::Applied {
                probability: *probability,
            }
        }
        InferenceOutcome::Failure { message } => Reconciliation::Failed {
            message: message.clone(),
        },
    }
}
