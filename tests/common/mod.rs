#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;

use realeyez_lib::{Frame, FrameSource, PlaybackPosition, Result};

/// A player whose position only changes when the test seeks it.
pub struct ManualSource {
    position: Mutex<f64>,
    paused: AtomicBool,
}

impl ManualSource {
    pub fn playing_at(secs: f64) -> Arc<Self> {
        Arc::new(Self {
            position: Mutex::new(secs),
            paused: AtomicBool::new(false),
        })
    }

    pub fn seek(&self, secs: f64) {
        *self.position.lock() = secs;
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }
}

impl FrameSource for ManualSource {
    fn current_position(&self) -> PlaybackPosition {
        PlaybackPosition::from_secs(*self.position.lock())
    }

    fn is_paused_or_ended(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn sample_frame(&self) -> Result<Frame> {
        Frame::new(vec![90; 32 * 18 * 3], 32, 18)
    }
}

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Await `fut`, failing the test after two seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}
