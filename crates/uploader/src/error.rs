//! Upload error types.

use chunkflow_transfer::TransferError;

/// Errors returned by an [`UploadService`](crate::UploadService).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response carried no data")]
    MissingData,

    #[error("invalid auth token")]
    InvalidToken,

    #[error("{0}")]
    Other(String),
}

/// Failure of a single chunk attempt.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("read failed: {0}")]
    Read(#[from] TransferError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Terminal failure of an upload.
///
/// Cancellation is not an error; it is reported as
/// [`UploadOutcome::Cancelled`](crate::UploadOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("init failed: {0}")]
    Init(#[source] ServiceError),

    #[error("chunk {index} failed after {attempts} attempts: {source}")]
    ChunkFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: ChunkError,
    },

    #[error("merge failed: {0}")]
    Finalize(#[source] ServiceError),

    #[error("upload incomplete: {confirmed} of {total} chunks confirmed")]
    Incomplete { confirmed: usize, total: usize },

    #[error("chunk plan disagrees with server: {0}")]
    PlanMismatch(String),

    #[error("upload {upload_id} cannot be resumed: {reason}")]
    NotResumable { upload_id: String, reason: String },

    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Why an upload pipeline stopped before success.
#[derive(Debug)]
pub(crate) enum Stop {
    Cancelled,
    Failed(UploadError),
}

impl From<UploadError> for Stop {
    fn from(e: UploadError) -> Self {
        Self::Failed(e)
    }
}

impl From<TransferError> for Stop {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => Self::Cancelled,
            other => Self::Failed(UploadError::Transfer(other)),
        }
    }
}
