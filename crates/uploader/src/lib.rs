//! Resumable chunked upload client.
//!
//! [`ChunkUploader`] drives one file through init, resume probing, a
//! bounded-concurrency chunk pipeline with per-chunk retries, and the final
//! merge. The remote side is abstracted behind [`UploadService`];
//! [`HttpUploadService`] talks to the HTTP chunk-upload API.

pub mod cancel;
pub mod config;
pub mod error;
mod finalizer;
pub mod http;
#[cfg(test)]
mod mock;
pub mod observer;
mod prober;
pub mod progress;
pub mod retry;
mod scheduler;
pub mod service;
pub mod uploader;

pub use cancel::CancelHandle;
pub use config::UploaderConfig;
pub use error::{ChunkError, ServiceError, UploadError};
pub use http::{HttpServiceConfig, HttpUploadService};
pub use observer::{UploadObserver, UploadOutcome, UploadReceipt};
pub use progress::ProgressCallback;
pub use retry::{RetryError, RetryPolicy};
pub use service::{ChunkUpload, ServiceFuture, UploadService};
pub use uploader::ChunkUploader;

pub use chunkflow_transfer::{ProgressSnapshot, SourceFile};
