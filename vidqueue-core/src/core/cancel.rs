//! Shared cancellation signal for a queue run.
//!
//! A `CancellationToken` cannot be reset once cancelled, so the flag keeps the
//! current token behind a lock and swaps in a fresh one on `clear()`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancellationFlag {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self) {
        self.current().cancel();
    }

    pub fn is_set(&self) -> bool {
        self.current().is_cancelled()
    }

    /// Resets the flag. Only call between runs; waiters on the old token stay cancelled.
    pub fn clear(&self) {
        let mut token = self.current();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        let token = self.current().clone();
        token.cancelled().await
    }
}

impl std::fmt::Debug for CancellationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationFlag")
            .field("set", &self.is_set())
            .finish()
    }
}
