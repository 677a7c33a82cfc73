//! In-memory [`UploadService`] used by the crate's tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chunkflow_protocol::{ChunkUploadInfo, InitUploadRequest, UploadStatus};

use crate::error::ServiceError;
use crate::service::{ChunkUpload, ServiceFuture, UploadService};

pub(crate) const MOCK_UPLOAD_ID: &str = "upload-1";

#[derive(Default)]
pub(crate) struct MockState {
    pub inits: Vec<InitUploadRequest>,
    /// Returned by init instead of the descriptor derived from the request.
    pub init_response: Option<ChunkUploadInfo>,
    pub init_error: bool,
    /// Chunks the server already holds.
    pub existing: BTreeSet<usize>,
    pub failing_probes: BTreeSet<usize>,
    pub probes: Vec<usize>,
    /// Remaining forced failures per chunk index.
    pub failures: HashMap<usize, u32>,
    pub attempts: HashMap<usize, u32>,
    /// Successful chunk uploads, in completion order.
    pub uploads: Vec<ChunkUpload>,
    pub in_flight: usize,
    pub max_in_flight: usize,
    /// `(upload_id, chunks held at merge time)` per merge call.
    pub merges: Vec<(String, usize)>,
    pub merge_error: bool,
    pub cancels: Vec<String>,
    /// Runs after a successful merge, before it answers.
    pub after_merge: Option<Box<dyn Fn() + Send>>,
    /// Returned by progress; derived from stored chunks when unset.
    pub progress_response: Option<ChunkUploadInfo>,
    pub progress_calls: usize,
}

impl MockState {
    /// Indices the server holds, pre-existing or uploaded.
    pub fn held(&self) -> BTreeSet<usize> {
        self.existing
            .iter()
            .copied()
            .chain(self.uploads.iter().map(|u| u.index))
            .collect()
    }
}

pub(crate) struct MockService {
    state: Mutex<MockState>,
    delay: Duration,
}

impl MockService {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every chunk upload takes `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            delay,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Total service calls of any kind.
    pub fn total_calls(&self) -> usize {
        let s = self.state();
        s.inits.len()
            + s.probes.len()
            + s.attempts.values().sum::<u32>() as usize
            + s.merges.len()
            + s.cancels.len()
            + s.progress_calls
    }
}

impl UploadService for MockService {
    fn init<'a>(&'a self, request: &'a InitUploadRequest) -> ServiceFuture<'a, ChunkUploadInfo> {
        Box::pin(async move {
            let mut s = self.state();
            s.inits.push(request.clone());
            if s.init_error {
                return Err(ServiceError::Api {
                    code: 400,
                    message: "文件大小必须大于0".into(),
                });
            }
            if let Some(info) = s.init_response.clone() {
                return Ok(info);
            }

            let total = u64::from(request.total_chunks);
            Ok(ChunkUploadInfo {
                upload_id: MOCK_UPLOAD_ID.into(),
                file_name: Some(request.file_name.clone()),
                file_size: Some(request.file_size),
                chunk_size: Some(request.file_size.div_ceil(total)),
                total_chunks: Some(request.total_chunks),
                uploaded_chunks: Some(0),
                md5_hash: request.md5_hash.clone(),
                user_id: Some(request.user_id),
                status: Some(UploadStatus::Uploading),
                ..Default::default()
            })
        })
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            {
                let mut s = self.state();
                s.in_flight += 1;
                s.max_in_flight = s.max_in_flight.max(s.in_flight);
                *s.attempts.entry(chunk.index).or_default() += 1;
            }

            if self.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.delay).await;
            }

            let mut s = self.state();
            s.in_flight -= 1;
            if let Some(left) = s.failures.get_mut(&chunk.index).filter(|left| **left > 0) {
                *left -= 1;
                return Err(ServiceError::Other(format!("chunk {} rejected", chunk.index)));
            }
            s.uploads.push(chunk);
            Ok(())
        })
    }

    fn exists<'a>(&'a self, _upload_id: &'a str, index: usize) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let mut s = self.state();
            s.probes.push(index);
            if s.failing_probes.contains(&index) {
                return Err(ServiceError::Other("probe failed".into()));
            }
            Ok(s.existing.contains(&index))
        })
    }

    fn merge<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let mut s = self.state();
            let held = s.held().len();
            s.merges.push((upload_id.to_string(), held));
            if s.merge_error {
                return Err(ServiceError::Api {
                    code: 500,
                    message: "文件MD5校验失败".into(),
                });
            }
            if let Some(hook) = &s.after_merge {
                hook();
            }
            Ok(format!("/files/{upload_id}"))
        })
    }

    fn cancel<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            self.state().cancels.push(upload_id.to_string());
            Ok(())
        })
    }

    fn progress<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ChunkUploadInfo> {
        Box::pin(async move {
            let mut s = self.state();
            s.progress_calls += 1;
            if let Some(info) = s.progress_response.clone() {
                return Ok(info);
            }
            Ok(ChunkUploadInfo {
                upload_id: upload_id.to_string(),
                uploaded_chunks: Some(s.held().len() as u32),
                status: Some(UploadStatus::Uploading),
                ..Default::default()
            })
        })
    }
}
