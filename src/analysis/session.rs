use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use frame_protocol::SessionId;

/// Hands out session ids that never repeat within a process.
pub struct SessionIds {
    next: AtomicU64,
}

impl SessionIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create a new, active session with a fresh id.
    pub fn begin(&self) -> Session {
        let id = SessionId::new(self.next.fetch_add(1, Ordering::Relaxed));
        Session {
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// One realtime analysis run.
///
/// Clones share the same activity flag, so the controller, the capture loop
/// and the UI all observe an invalidation at once. Invalidation is terminal:
/// there is no way back to active; resuming means starting a new session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    active: Arc<AtomicBool>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark the session inactive. Returns `true` if this call flipped it.
    pub fn invalidate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}
