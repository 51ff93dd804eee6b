use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use frame_protocol::{InferenceResult, PlaybackPosition, SessionId, WorkerRequest, WorkerResponse};

use super::capture::{CaptureLoop, Termination};
use super::reconcile::{reconcile, Reconciliation, VisibleState};
use super::session::{Session, SessionIds};
use super::worker::{InferenceWorker, WorkerHandle};
use crate::config::PipelineConfig;
use crate::diagnostics::stats::{PipelineSnapshot, PipelineStats};
use crate::error::{AnalysisError, Result};
use crate::source::FrameSource;

/// Callback for reporting inference failures of the active session.
/// Arguments: (session_id, error_message).
pub type ErrorCallback = Arc<dyn Fn(SessionId, &str) + Send + Sync>;

/// Most recent inference failure for the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub session_id: SessionId,
    pub captured_at: PlaybackPosition,
    pub message: String,
}

/// Everything reconciliation must see in one critical section.
struct Displayed {
    active: Option<Session>,
    visible: VisibleState,
    source: Arc<dyn FrameSource>,
}

impl Displayed {
    /// Id of the active session, if it has not been invalidated.
    fn active_id(&self) -> Option<SessionId> {
        self.active
            .as_ref()
            .filter(|session| session.is_active())
            .map(Session::id)
    }

    /// Clear the active slot if it still holds `session_id`.
    fn release(&mut self, session_id: SessionId) -> bool {
        if self.active.as_ref().map(Session::id) == Some(session_id) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

struct Shared {
    config: PipelineConfig,
    ids: SessionIds,
    displayed: Mutex<Displayed>,
    jobs: mpsc::Sender<WorkerRequest>,
    visible_tx: watch::Sender<VisibleState>,
    analyzing_tx: watch::Sender<bool>,
    failure_tx: watch::Sender<Option<FailureReport>>,
    stats: Arc<Mutex<PipelineStats>>,
    on_error: Option<ErrorCallback>,
}

impl Shared {
    /// Reconcile one result against the live session and position.
    ///
    /// The active id, the position read and the write all happen under the
    /// `displayed` lock, so a stop or seek cannot interleave with them.
    fn apply(&self, result: InferenceResult) -> Reconciliation {
        let outcome = {
            let mut displayed = self.displayed.lock();
            let active = displayed.active_id();
            let now = displayed.source.current_position();
            let outcome = reconcile(&mut displayed.visible, active, now, &result);
            if matches!(outcome, Reconciliation::Applied { .. }) {
                self.visible_tx.send_replace(displayed.visible.clone());
            }
            outcome
        };

        let session_id = result.session_id;
        let captured_at = result.captured_at;
        let mut stats = self.stats.lock();
        match &outcome {
            Reconciliation::Applied { probability } => {
                stats.record_applied();
                debug!("{session_id} at {captured_at}: showing {probability:.1}%");
            }
            Reconciliation::Failed { message } => {
                stats.record_failed();
                drop(stats);
                warn!("inference failed for {session_id} at {captured_at}: {message}");
                self.failure_tx.send_replace(Some(FailureReport {
                    session_id,
                    captured_at,
                    message: message.clone(),
                }));
                if let Some(cb) = &self.on_error {
                    cb(session_id, message);
                }
            }
            Reconciliation::StaleSession => {
                stats.record_stale_session();
                debug!("discarding result for inactive {session_id}");
            }
            Reconciliation::StalePosition => {
                stats.record_stale_position();
                debug!("discarding result for {session_id}: player moved past {captured_at}");
            }
        }
        outcome
    }

    /// Publish the analyzing flag for the current slot.
    ///
    /// Called with the `displayed` lock held by every path that changes
    /// `active`, so flag updates land in the same order as slot changes.
    fn publish_analyzing(&self, displayed: &Displayed) {
        self.analyzing_tx.send_replace(displayed.active.is_some());
    }

    fn capture_finished(&self, session_id: SessionId, reason: Termination) {
        let released = {
            let mut displayed = self.displayed.lock();
            let released = displayed.release(session_id);
            if released {
                self.publish_analyzing(&displayed);
            }
            released
        };
        if !released {
            debug!("capture loop for superseded {session_id} exited: {reason:?}");
            return;
        }
        match reason {
            Termination::WorkerGone => warn!("analysis for {session_id} ended: worker gone"),
            _ => info!("analysis for {session_id} ended: {reason:?}"),
        }
    }
}

/// Owns the realtime analysis pipeline for one player.
///
/// Starts and stops sessions, runs one capture loop per session and a single
/// result handler for the lifetime of the controller. Observers follow the
/// visible estimate and the analyzing flag through watch channels.
pub struct AnalysisController {
    shared: Arc<Shared>,
    runtime: Handle,
    result_task: JoinHandle<()>,
    worker_task: Option<JoinHandle<()>>,
}

impl AnalysisController {
    /// Build a controller backed by a real HTTP inference worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: PipelineConfig,
        source: Arc<dyn FrameSource>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self> {
        config.validate()?;
        let WorkerHandle {
            jobs,
            results,
            task,
        } = InferenceWorker::new(config.max_in_flight)?.spawn();
        let mut controller = Self::with_worker_channels(config, source, jobs, results, on_error)?;
        controller.worker_task = Some(task);
        Ok(controller)
    }

    /// Build a controller around existing worker channels.
    ///
    /// Whatever reads `jobs` and writes `results` acts as the inference
    /// worker; tests plug in a scripted one here.
    pub fn with_worker_channels(
        config: PipelineConfig,
        source: Arc<dyn FrameSource>,
        jobs: mpsc::Sender<WorkerRequest>,
        results: mpsc::Receiver<WorkerResponse>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self> {
        config.validate()?;
        if jobs.is_closed() {
            return Err(AnalysisError::WorkerUnavailable);
        }
        let runtime = Handle::try_current().map_err(|_| AnalysisError::NoRuntime)?;

        let (visible_tx, _) = watch::channel(VisibleState::neutral());
        let (analyzing_tx, _) = watch::channel(false);
        let (failure_tx, _) = watch::channel(None);

        let shared = Arc::new(Shared {
            config,
            ids: SessionIds::new(),
            displayed: Mutex::new(Displayed {
                active: None,
                visible: VisibleState::neutral(),
                source,
            }),
            jobs,
            visible_tx,
            analyzing_tx,
            failure_tx,
            stats: Arc::new(Mutex::new(PipelineStats::new())),
            on_error,
        });

        let result_task = runtime.spawn(handle_results(Arc::clone(&shared), results));

        Ok(Self {
            shared,
            runtime,
            result_task,
            worker_task: None,
        })
    }

    /// Begin a new session and its capture loop.
    ///
    /// A session already running is invalidated first; its late results are
    /// discarded from here on.
    pub fn start(&self) -> Session {
        let session = self.shared.ids.begin();
        let source = {
            let mut displayed = self.shared.displayed.lock();
            if let Some(previous) = displayed.active.replace(session.clone()) {
                if previous.invalidate() {
                    info!("{} superseded by {}", previous.id(), session.id());
                }
            }
            self.shared.publish_analyzing(&displayed);
            Arc::clone(&displayed.source)
        };

        let capture = CaptureLoop::new(
            session.clone(),
            source,
            self.shared.jobs.clone(),
            Arc::clone(&self.shared.stats),
            &self.shared.config,
        );
        let shared = Arc::clone(&self.shared);
        let tick_interval = self.shared.config.tick_interval();
        let session_id = session.id();
        self.runtime.spawn(async move {
            let reason = capture.run(tick_interval).await;
            shared.capture_finished(session_id, reason);
        });

        info!("analysis started: {session_id}");
        session
    }

    /// End `session`. Stopping a session that already ended, or one that was
    /// superseded, changes nothing else.
    ///
    /// In-flight inference calls are not cancelled; their results are
    /// discarded when they arrive.
    pub fn stop(&self, session: &Session) {
        let flipped = session.invalidate();
        {
            let mut displayed = self.shared.displayed.lock();
            if displayed.release(session.id()) {
                self.shared.publish_analyzing(&displayed);
            }
        }
        if flipped {
            info!("analysis stopped: {}", session.id());
        }
    }

    /// Switch to a new video: ends any session, swaps the frame source and
    /// resets the displayed estimate.
    pub fn load_video(&self, source: Arc<dyn FrameSource>) {
        let ended = {
            let mut displayed = self.shared.displayed.lock();
            let ended = displayed.active.take();
            if let Some(session) = &ended {
                session.invalidate();
            }
            displayed.source = source;
            displayed.visible = VisibleState::neutral();
            self.shared.visible_tx.send_replace(displayed.visible.clone());
            self.shared.publish_analyzing(&displayed);
            ended
        };
        self.shared.failure_tx.send_replace(None);
        self.shared.stats.lock().reset();
        match ended {
            Some(session) => info!("video loaded, {} ended", session.id()),
            None => info!("video loaded"),
        }
    }

    /// Current displayed estimate.
    pub fn visible_state(&self) -> VisibleState {
        self.shared.displayed.lock().visible.clone()
    }

    /// Follow the displayed estimate. A new value is published on every
    /// applied result and on video load.
    pub fn subscribe(&self) -> watch::Receiver<VisibleState> {
        self.shared.visible_tx.subscribe()
    }

    /// Whether a session is currently analysing.
    pub fn analyzing(&self) -> bool {
        *self.shared.analyzing_tx.borrow()
    }

    pub fn watch_analyzing(&self) -> watch::Receiver<bool> {
        self.shared.analyzing_tx.subscribe()
    }

    /// Recoverable error channel: the latest failure for the active session.
    pub fn watch_failures(&self) -> watch::Receiver<Option<FailureReport>> {
        self.shared.failure_tx.subscribe()
    }

    /// Id of the session holding the controller, if any. Always agrees with
    /// [`analyzing`](Self::analyzing).
    pub fn active_session(&self) -> Option<SessionId> {
        self.shared
            .displayed
            .lock()
            .active
            .as_ref()
            .map(Session::id)
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.shared.stats.lock().snapshot()
    }
}

impl Drop for AnalysisController {
    fn drop(&mut self) {
        if let Some(session) = self.shared.displayed.lock().active.take() {
            session.invalidate();
        }
        self.result_task.abort();
        if let Some(task) = &self.worker_task {
            task.abort();
        }
    }
}

async fn handle_results(shared: Arc<Shared>, mut results: mpsc::Receiver<WorkerResponse>) {
    while let Some(response) = results.recv().await {
        shared.apply(InferenceResult::from(response));
    }
    debug!("result channel closed");
}
