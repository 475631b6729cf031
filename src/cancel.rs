//! Cancellation token for the DFU presence watcher
//!
//! The watcher polls until a device appears or the operator cancels; the
//! token is checked each iteration instead of intercepting OS signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared between the watch loop and whatever
/// drives the operator's cancel action (usually a stdin reader thread).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
