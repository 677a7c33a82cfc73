pub mod constants;
pub mod envelope;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::ApiResponse;
pub use types::{ChunkUploadInfo, InitUploadRequest, UploadStatus};
