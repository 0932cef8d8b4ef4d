//! Cooperative cancellation for long-running transfers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::TransferError;

/// Shared flag checked between archive entries.
///
/// Cancelling an export closes its pipe with [`TransferError::Cancelled`];
/// cancelling an import stops extraction and still removes the staging area.
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

    /// Fail with [`TransferError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), TransferError> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}
