//! Caller-facing upload configuration.

use std::time::Duration;

use chunkflow_transfer::DEFAULT_CHUNK_SIZE;

use crate::error::UploadError;
use crate::retry::RetryPolicy;

/// Tuning knobs for [`ChunkUploader`](crate::ChunkUploader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Bytes per chunk. The server may negotiate a different size.
    pub chunk_size: u64,
    /// Chunk transfers in flight at once.
    pub max_concurrency: usize,
    /// Retries per chunk after the first attempt.
    pub retry_count: u32,
    /// Backoff unit; the n-th retry waits `n * retry_base_delay`.
    pub retry_base_delay: Duration,
    /// Send MD5 digests on init and with every chunk.
    pub verify_integrity: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: 3,
            retry_count: 3,
            retry_base_delay: Duration::from_secs(1),
            verify_integrity: true,
        }
    }
}

impl UploaderConfig {
    /// Rejects a zero chunk size or zero concurrency.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::Config("chunk_size must be greater than 0".into()));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(UploadError::Config(format!(
                "chunk_size {} does not fit in memory",
                self.chunk_size
            )));
        }
        if self.max_concurrency == 0 {
            return Err(UploadError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retry_count,
            base_delay: self.retry_base_delay,
        }
    }
}
