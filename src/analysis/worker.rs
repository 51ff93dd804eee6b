use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use frame_protocol::{
    ProtocolError, ServerVerdict, Verdict, WorkerRequest, WorkerResponse, IMAGE_FIELD,
    IMAGE_FILE_NAME, IMAGE_MIME,
};

use crate::error::Result;

/// Capacity of the result channel back to the controller.
const RESULT_CAPACITY: usize = 64;

/// Why one inference call failed. Only its message crosses the boundary.
#[derive(Debug, Error)]
enum CallError {
    #[error("inference request failed: {0}")]
    Transport(reqwest::Error),

    #[error("inference service returned HTTP {}", .0.as_u16())]
    Status(StatusCode),

    #[error("inference response unreadable: {0}")]
    Body(reqwest::Error),

    #[error(transparent)]
    Verdict(#[from] ProtocolError),
}

/// Channels connecting a running worker to the rest of the pipeline.
pub struct WorkerHandle {
    /// Inbox for frames to analyse.
    pub jobs: mpsc::Sender<WorkerRequest>,
    /// One response per executed request, in completion order.
    pub results: mpsc::Receiver<WorkerResponse>,
    pub task: JoinHandle<()>,
}

/// Performs inference calls off the capture path.
///
/// The worker shares nothing with its callers: requests come in and responses
/// go out as owned messages. At most `max_in_flight` calls run at once; a
/// request that arrives while every slot is taken is dropped and produces no
/// response.
pub struct InferenceWorker {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl InferenceWorker {
    pub fn new(max_in_flight: usize) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, max_in_flight))
    }

    pub fn with_client(client: reqwest::Client, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// Start the worker task. It runs until every job sender is dropped.
    pub fn spawn(self) -> WorkerHandle {
        let (job_tx, job_rx) = mpsc::channel(self.max_in_flight);
        let (result_tx, result_rx) = mpsc::channel(RESULT_CAPACITY);
        let task = tokio::spawn(self.run(job_rx, result_tx));
        WorkerHandle {
            jobs: job_tx,
            results: result_rx,
            task,
        }
    }

    async fn run(
        self,
        mut jobs: mpsc::Receiver<WorkerRequest>,
        results: mpsc::Sender<WorkerResponse>,
    ) {
        while let Some(request) = jobs.recv().await {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!(
                    "all {} inference slots busy, dropping frame at {} for {}",
                    self.max_in_flight, request.captured_at, request.session_id
                );
                continue;
            };
            let client = self.client.clone();
            let results = results.clone();
            tokio::spawn(async move {
                let response = execute(&client, &request).await;
                drop(permit);
                if results.send(response).await.is_err() {
                    trace!("result receiver gone, discarding response");
                }
            });
        }
        debug!("inference worker inbox closed");
    }
}

/// Post one frame and turn the outcome into a tagged response.
///
/// Never fails: transport errors, non-2xx statuses and bad bodies all come
/// back as a failure response carrying the request's tags.
pub async fn execute(client: &reqwest::Client, request: &WorkerRequest) -> WorkerResponse {
    match post_frame(client, request).await {
        Ok(verdict) => {
            trace!(
                "{} at {}: {:.1}%",
                request.session_id,
                request.captured_at,
                verdict.probability
            );
            request.succeeded(verdict)
        }
        Err(e) => {
            debug!("{} at {}: {e}", request.session_id, request.captured_at);
            request.failed(e.to_string())
        }
    }
}

async fn post_frame(
    client: &reqwest::Client,
    request: &WorkerRequest,
) -> std::result::Result<Verdict, CallError> {
    let part = Part::bytes(request.payload.clone())
        .file_name(IMAGE_FILE_NAME)
        .mime_str(IMAGE_MIME)
        .map_err(CallError::Transport)?;
    let form = Form::new().part(IMAGE_FIELD, part);

    let response = client
        .post(&request.endpoint)
        .multipart(form)
        .send()
        .await
        .map_err(CallError::Transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(CallError::Status(status));
    }

    let body: ServerVerdict = response.json().await.map_err(CallError::Body)?;
    Ok(body.into_verdict()?)
}
