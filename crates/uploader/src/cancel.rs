//! Cancellation of a running upload.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::service::UploadService;

/// Cloneable handle that cancels the running upload of one
/// [`ChunkUploader`](crate::ChunkUploader).
///
/// Every upload invocation gets a fresh token, so a cancel only reaches the
/// upload running when it is requested. A cancel with no upload running is a
/// no-op for later uploads. Transfers already on the wire are allowed to
/// finish but their results are ignored.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the running upload. Idempotent.
    ///
    /// The upload stops admitting chunks, tells the server to discard the
    /// partial upload, and resolves to
    /// [`UploadOutcome::Cancelled`](crate::UploadOutcome::Cancelled). A merge
    /// that already succeeded is kept.
    pub fn cancel(&self) {
        let token = self.token();
        if !token.is_cancelled() {
            info!("upload cancellation requested");
        }
        token.cancel();
    }

    /// Whether the current (or most recent) upload was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    /// Installs a fresh token for a new upload invocation and returns it.
    pub(crate) fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    fn token(&self) -> CancellationToken {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Asks the server to discard a partial upload. Failures are logged only.
pub(crate) async fn notify_server(service: &dyn UploadService, upload_id: &str) {
    match service.cancel(upload_id).await {
        Ok(()) => info!(upload_id, "server discarded partial upload"),
        Err(e) => warn!(upload_id, error = %e, "failed to notify server of cancellation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        let token = handle.begin();
        assert!(!handle.is_cancelled());

        clone.cancel();
        clone.cancel();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[test]
    fn begin_starts_uncancelled() {
        let handle = CancelHandle::new();
        let first = handle.begin();
        handle.cancel();
        assert!(first.is_cancelled());

        let second = handle.begin();
        assert!(!second.is_cancelled());
        assert!(!handle.is_cancelled());
        // The earlier token stays cancelled.
        assert!(first.is_cancelled());
    }
}
