//! Remote chunk-upload service abstraction.
//!
//! [`HttpUploadService`](crate::HttpUploadService) implements this on top of
//! the HTTP API; tests use in-memory mocks.

use std::future::Future;
use std::pin::Pin;

use chunkflow_protocol::{ChunkUploadInfo, InitUploadRequest};

use crate::error::ServiceError;

/// Boxed future returned by [`UploadService`] methods.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// One chunk ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub index: usize,
    pub data: Vec<u8>,
    /// MD5 of `data`, lowercase hex, when integrity checking is on.
    pub md5: Option<String>,
}

/// Operations of the chunk-upload service.
pub trait UploadService: Send + Sync {
    /// Opens an upload and returns its descriptor, including the negotiated
    /// chunk size and count.
    fn init<'a>(&'a self, request: &'a InitUploadRequest) -> ServiceFuture<'a, ChunkUploadInfo>;

    /// Stores one chunk. Idempotent on the server.
    fn upload_chunk(&self, chunk: ChunkUpload) -> ServiceFuture<'_, ()>;

    /// Reports whether the server already holds a chunk.
    fn exists<'a>(&'a self, upload_id: &'a str, index: usize) -> ServiceFuture<'a, bool>;

    /// Merges all chunks and returns the final artifact path.
    fn merge<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, String>;

    /// Discards a partial upload.
    fn cancel<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ()>;

    /// Returns the server-side descriptor, including the uploaded count.
    fn progress<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ChunkUploadInfo>;
}
