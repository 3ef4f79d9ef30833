//! Cooperative cancellation for long-running engine calls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MixError, Result};

/// Shared flag an engine polls between units of work.
///
/// Clones share the same flag, so the command loop can hand one clone to an
/// engine call and raise it from a signal handler or another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    raised: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Clear a previous request so the flag can be reused for the next command
    pub fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is raised
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MixError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(flag.check().is_ok());

        handle.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(MixError::Cancelled)));

        flag.reset();
        assert!(!handle.is_cancelled());
    }
}
