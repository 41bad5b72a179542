//! Cancellation controller.
//!
//! Holds at most one live [`CancellationToken`]. Issuing a new token forgets
//! the previous one without cancelling it; only [`CancellationController::abort`]
//! signals cancellation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use swr_request_core::options::CancelledFn;
use swr_request_core::{CancellationToken, RequestError};

/// A token handed to one request
///
/// The id ties the token to the request that owns it, so a settling request
/// only ever releases its own token.
#[derive(Debug, Clone)]
pub struct InFlightToken {
    id: u64,
    token: CancellationToken,
}

impl InFlightToken {
    /// Identifier of this token, unique per controller
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The cancellation signal passed to the executor
    #[must_use]
    pub fn signal(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Check if this token has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owns the single in-flight cancellation token for a session
pub struct CancellationController {
    current: Mutex<Option<InFlightToken>>,
    next_id: AtomicU64,
    on_cancelled: CancelledFn,
}

impl CancellationController {
    /// Create a controller that calls `on_cancelled` after every abort
    #[must_use]
    pub fn new(on_cancelled: CancelledFn) -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            on_cancelled,
        }
    }

    /// Issue a fresh token, superseding (not cancelling) any current one
    pub fn issue(&self) -> InFlightToken {
        let token = InFlightToken {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());

        if let Some(previous) = previous {
            tracing::debug!(
                superseded = previous.id,
                token = token.id,
                "Superseded in-flight token"
            );
        }

        token
    }

    /// Release `token` once its request settled
    ///
    /// Does nothing if a newer token has replaced it, or if it was aborted.
    /// Returns whether `token` was the one held.
    pub fn release(&self, token: &InFlightToken) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|held| held.id == token.id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Cancel the in-flight request
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoPendingRequest`] if no token is held.
    pub fn abort(&self) -> Result<(), RequestError> {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RequestError::NoPendingRequest)?;

        tracing::debug!(token = token.id, "Aborting in-flight request");
        token.token.cancel();
        (self.on_cancelled)();

        Ok(())
    }

    /// Check if a token is currently held
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}
