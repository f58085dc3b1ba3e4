use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a pipeline run.
///
/// Clones share the same flag. The pipeline polls it at stage boundaries and
/// between matched columns and validation rules.
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

/// Marker error returned by stages that observed a cancelled token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;
