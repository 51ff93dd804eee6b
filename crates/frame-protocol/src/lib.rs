//! Message contract for the frame inference boundary.
//!
//! The capture side and the inference worker share no memory: everything that
//! crosses between them is one of the owned message types below. Every
//! response carries the `session_id` and `captured_at` of the request that
//! produced it, which is the only way results are correlated with jobs.

mod batch;
mod error;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use batch::{average_probability, parse_batch_csv, BatchReport, BatchRow, BATCH_HEADER};
pub use error::{ProtocolError, Result};

/// Multipart field name carrying the encoded frame.
pub const IMAGE_FIELD: &str = "image";
/// File name attached to the multipart image part.
pub const IMAGE_FILE_NAME: &str = "frame.jpg";
/// MIME type of the encoded frame.
pub const IMAGE_MIME: &str = "image/jpeg";
/// Upper bound of a deepfake probability (percent).
pub const MAX_PROBABILITY: f64 = 100.0;

/// Identity of one realtime analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Playback position in seconds.
///
/// Compared with exact equality: a result is only current when its position
/// is bit-for-bit the position the player reports now.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackPosition(f64);

impl PlaybackPosition {
    pub const ZERO: Self = Self(0.0);

    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(self) -> f64 {
        self.0
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// One sampled, encoded frame awaiting analysis.
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub session_id: SessionId,
    /// Player position at the moment the frame was sampled.
    pub captured_at: PlaybackPosition,
    /// Encoded JPEG bytes.
    pub payload: Vec<u8>,
}

impl FrameJob {
    /// Address the job to an inference endpoint.
    pub fn into_request(self, endpoint: impl Into<String>) -> WorkerRequest {
        WorkerRequest {
            payload: self.payload,
            endpoint: endpoint.into(),
            session_id: self.session_id,
            captured_at: self.captured_at,
        }
    }
}

/// Inbound worker message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub payload: Vec<u8>,
    pub endpoint: String,
    pub session_id: SessionId,
    pub captured_at: PlaybackPosition,
}

impl WorkerRequest {
    /// Build the success response for this request, echoing its tags.
    pub fn succeeded(&self, verdict: Verdict) -> WorkerResponse {
        WorkerResponse {
            success: true,
            result: Some(verdict),
            error: None,
            session_id: self.session_id,
            captured_at: self.captured_at,
        }
    }

    /// Build the failure response for this request, echoing its tags.
    pub fn failed(&self, message: impl Into<String>) -> WorkerResponse {
        WorkerResponse {
            success: false,
            result: None,
            error: Some(message.into()),
            session_id: self.session_id,
            captured_at: self.captured_at,
        }
    }
}

/// Validated probability carried by a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub probability: f64,
}

impl Verdict {
    pub fn new(probability: f64) -> Result<Self> {
        if probability.is_finite() && (0.0..=MAX_PROBABILITY).contains(&probability) {
            Ok(Self { probability })
        } else {
            Err(ProtocolError::ProbabilityOutOfRange(probability))
        }
    }
}

/// JSON body returned by the frame inference endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerVerdict {
    pub deepfake_probability: f64,
}

impl ServerVerdict {
    pub fn into_verdict(self) -> Result<Verdict> {
        Verdict::new(self.deepfake_probability)
    }
}

/// Outbound worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub session_id: SessionId,
    pub captured_at: PlaybackPosition,
}

/// Outcome of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Success { probability: f64 },
    Failure { message: String },
}

/// A worker response decoded for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub session_id: SessionId,
    pub captured_at: PlaybackPosition,
    pub outcome: InferenceOutcome,
}

impl InferenceResult {
    pub fn success(session_id: SessionId, captured_at: PlaybackPosition, probability: f64) -> Self {
        Self {
            session_id,
            captured_at,
            outcome: InferenceOutcome::Success { probability },
        }
    }

    pub fn failure(
        session_id: SessionId,
        captured_at: PlaybackPosition,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            captured_at,
            outcome: InferenceOutcome::Failure {
                message: message.into(),
            },
        }
    }
}

impl From<WorkerResponse> for InferenceResult {
    fn from(response: WorkerResponse) -> Self {
        let outcome = match (response.success, response.result) {
            (true, Some(verdict)) => match Verdict::new(verdict.probability) {
                Ok(v) => InferenceOutcome::Success {
                    probability: v.probability,
                },
                Err(e) => InferenceOutcome::Failure {
                    message: e.to_string(),
                },
            },
            (true, None) => InferenceOutcome::Failure {
                message: ProtocolError::MissingResult.to_string(),
            },
            (false, _) => InferenceOutcome::Failure {
                message: response
                    .error
                    .unwrap_or_else(|| "inference failed".to_string()),
            },
        };
        Self {
            session_id: response.session_id,
            captured_at: response.captured_at,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request() -> WorkerRequest {
        FrameJob {
            session_id: SessionId::new(7),
            captured_at: PlaybackPosition::from_secs(1.5),
            payload: vec![0xFF, 0xD8, 0xFF, 0xD9],
        }
        .into_request("http://localhost:8000/frame-inference/")
    }

    #[test]
    fn into_request_keeps_job_tags() {
        let req = make_request();
        assert_eq!(req.session_id, SessionId::new(7));
        assert_eq!(req.captured_at, PlaybackPosition::from_secs(1.5));
        assert_eq!(req.endpoint, "http://localhost:8000/frame-inference/");
        assert_eq!(req.payload.len(), 4);
    }

    #[test]
    fn success_response_serialises_to_wire_shape() {
        let req = make_request();
        let resp = req.succeeded(Verdict::new(92.0).unwrap());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["probability"], 92.0);
        assert_eq!(json["sessionId"], 7);
        assert_eq!(json["capturedAt"], 1.5);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_response_serialises_to_wire_shape() {
        let req = make_request();
        let resp = req.failed("Failed to analyze frame");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Failed to analyze frame");
        assert_eq!(json["sessionId"], 7);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn verdict_rejects_out_of_range_probabilities() {
        assert!(Verdict::new(0.0).is_ok());
        assert!(Verdict::new(100.0).is_ok());
        assert_eq!(
            Verdict::new(100.5),
            Err(ProtocolError::ProbabilityOutOfRange(100.5))
        );
        assert!(Verdict::new(-1.0).is_err());
        assert!(Verdict::new(f64::NAN).is_err());
    }

    #[test]
    fn server_verdict_parses_endpoint_body() {
        let body: ServerVerdict = serde_json::from_str(r#"{"deepfake_probability": 77.25}"#).unwrap();
        assert_eq!(body.into_verdict().unwrap().probability, 77.25);
    }

    #[test]
    fn inference_result_from_success_response() {
        let req = make_request();
        let result = InferenceResult::from(req.succeeded(Verdict::new(40.0).unwrap()));
        assert_eq!(
            result,
            InferenceResult::success(SessionId::new(7), PlaybackPosition::from_secs(1.5), 40.0)
        );
    }

    #[test]
    fn inference_result_from_success_without_result_is_failure() {
        let resp = WorkerResponse {
            success: true,
            result: None,
            error: None,
            session_id: SessionId::new(3),
            captured_at: PlaybackPosition::ZERO,
        };
        let result = InferenceResult::from(resp);
        assert!(matches!(result.outcome, InferenceOutcome::Failure { .. }));
        assert_eq!(result.session_id, SessionId::new(3));
    }

    #[test]
    fn inference_result_revalidates_deserialised_probability() {
        let json = r#"{"success":true,"result":{"probability":250.0},"sessionId":1,"capturedAt":0.5}"#;
        let resp: WorkerResponse = serde_json::from_str(json).unwrap();
        let result = InferenceResult::from(resp);
        match result.outcome {
            InferenceOutcome::Failure { message } => assert!(message.contains("250")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn inference_result_from_failure_keeps_message() {
        let req = make_request();
        let result = InferenceResult::from(req.failed("HTTP 503"));
        assert_eq!(
            result.outcome,
            InferenceOutcome::Failure {
                message: "HTTP 503".to_string()
            }
        );
    }

    #[test]
    fn session_id_display_is_prefixed() {
        assert_eq!(SessionId::new(12).to_string(), "S12");
    }
}
