//! Chunk planning, integrity hashing and session bookkeeping for chunked
//! uploads.

mod chunked;
mod plan;
mod progress;
mod session;
mod validation;

pub use chunked::{SourceFile, calculate_file_checksum, checksum_bytes};
pub use plan::{Chunk, ChunkPlan};
pub use progress::{ProgressSnapshot, SpeedCalculator};
pub use session::TransferSession;
pub use validation::{FileTypeFilter, format_file_size, validate_upload_file};

/// Default chunk size: 2 MiB.
///
/// The server may negotiate a different size in its init response.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("chunk index out of range: {index} (plan has {total})")]
    ChunkOutOfRange { index: usize, total: usize },

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("cancelled")]
    Cancelled,
}
