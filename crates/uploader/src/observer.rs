//! Terminal outcome of an upload and the optional observer adapter.

use chunkflow_transfer::ProgressSnapshot;

use crate::error::UploadError;

/// What a completed upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Empty when nothing was sent (empty file).
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: usize,
    /// Chunks the server already held before this invocation.
    pub reused_chunks: usize,
    /// Artifact path returned by the merge; `None` for an empty file.
    pub final_path: Option<String>,
    pub file_checksum: Option<String>,
}

/// Result of one upload invocation. Exactly one variant is produced.
#[derive(Debug)]
pub enum UploadOutcome {
    Completed(UploadReceipt),
    Failed(UploadError),
    Cancelled,
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Fires the matching observer callback, exactly once.
    pub fn notify(&self, observer: &dyn UploadObserver) {
        match self {
            Self::Completed(receipt) => observer.on_success(receipt),
            Self::Failed(error) => observer.on_error(error),
            Self::Cancelled => observer.on_cancelled(),
        }
    }

    /// Converts into a `Result`, with cancellation as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<UploadReceipt>, UploadError> {
        match self {
            Self::Completed(receipt) => Ok(Some(receipt)),
            Self::Failed(error) => Err(error),
            Self::Cancelled => Ok(None),
        }
    }
}

/// Callback-style view of an upload. Every method defaults to a no-op.
pub trait UploadObserver: Send + Sync {
    /// The server assigned (or confirmed) the upload id. `chunk_size` is the
    /// size the file is split with; a later resume needs it.
    fn on_started(&self, _upload_id: &str, _chunk_size: u64) {}

    fn on_progress(&self, _progress: &ProgressSnapshot) {}

    fn on_success(&self, _receipt: &UploadReceipt) {}

    fn on_error(&self, _error: &UploadError) {}

    fn on_cancelled(&self) {}
}
