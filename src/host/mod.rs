//! Host-side engine: discovery, checkpointing, orchestration.

pub mod checkpoint;
pub mod engine;
pub mod serial;

pub use checkpoint::{CheckpointStore, ResumeCheckpoint};
pub use engine::{Detection, HostEngine};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token.
///
/// The shell (GUI button, Ctrl-C handler) holds a clone and trips it; the
/// engine polls it at every suspension point and winds the operation down
/// through the device's CANCEL handshake.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next operation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }
}
