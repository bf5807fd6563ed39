// src/cancel.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative abort flag shared between the orchestrator and a worker task.
/// Loaders poll it at loop iterations and around network reads; the
/// orchestrator re-checks it before emitting any terminal event, so a loader
/// that ignores the flag can only waste work, never leak a stale result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
