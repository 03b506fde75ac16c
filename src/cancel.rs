//! Cooperative cancellation, checked at chunk and candidate-search
//! boundaries rather than via thread interruption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PackagerError, Result};

/// A shared, cloneable flag. Call [`cancel`](Self::cancel) from any thread
/// (e.g. a signal handler or a UI's cancel button); long-running loops call
/// [`check`](Self::check) between units of work and bail out with
/// [`PackagerError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`PackagerError::Cancelled`] if cancellation has been
    /// requested; otherwise `Ok(())`. Intended for use at the top of a loop
    /// body with `token.check()?;`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PackagerError::Cancelled)
        } else {
            Ok(())
        }
    }
}
