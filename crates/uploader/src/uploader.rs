//! Upload orchestrator.
//!
//! Pipeline for one file:
//! 1. Plan chunks (an empty file completes here without server contact)
//! 2. Hash the whole file (when integrity checking is on)
//! 3. Init, or fetch the descriptor of the upload being resumed
//! 4. Re-plan if the server negotiated a different chunk count; a resumed
//!    upload must match the server's chunking exactly
//! 5. Probe which chunks the server already holds
//! 6. Transfer the rest, at most `max_concurrency` at a time
//! 7. Cross-check the server's count, then merge

use std::sync::Arc;

use chunkflow_protocol::{ChunkUploadInfo, InitUploadRequest};
use chunkflow_transfer::{
    ChunkPlan, ProgressSnapshot, SourceFile, TransferSession, calculate_file_checksum,
    validate_upload_file,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::{self, CancelHandle};
use crate::config::UploaderConfig;
use crate::error::{Stop, UploadError};
use crate::finalizer::finalize;
use crate::observer::{UploadObserver, UploadOutcome, UploadReceipt};
use crate::prober::probe_existing;
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::scheduler::ChunkScheduler;
use crate::service::UploadService;

/// How an invocation obtains its upload id.
#[derive(Clone, Copy)]
enum Start<'a> {
    Fresh {
        owner_id: i64,
    },
    /// `chunk_size` is the size the interrupted upload was split with.
    Resume {
        upload_id: &'a str,
        chunk_size: Option<u64>,
    },
}

/// Uploads files in chunks against an [`UploadService`].
///
/// One uploader runs one upload at a time. Its [`CancelHandle`] targets
/// whichever invocation is running.
pub struct ChunkUploader {
    service: Arc<dyn UploadService>,
    config: UploaderConfig,
    callbacks: Vec<ProgressCallback>,
    cancel: CancelHandle,
}

impl ChunkUploader {
    /// Creates an uploader, rejecting an invalid configuration.
    pub fn new(service: Arc<dyn UploadService>, config: UploaderConfig) -> Result<Self, UploadError> {
        config.validate()?;
        Ok(Self {
            service,
            config,
            callbacks: Vec::new(),
            cancel: CancelHandle::new(),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Registers a progress callback for every upload of this uploader.
    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.callbacks.push(callback);
    }

    /// Returns a handle that cancels the running upload.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Uploads `source` on behalf of `owner_id`.
    pub async fn upload(&self, source: &SourceFile, owner_id: i64) -> UploadOutcome {
        self.execute(source, Start::Fresh { owner_id }, None).await
    }

    /// Like [`upload`](Self::upload), also reporting to `observer`.
    pub async fn upload_with_observer(
        &self,
        source: &SourceFile,
        owner_id: i64,
        observer: &dyn UploadObserver,
    ) -> UploadOutcome {
        self.execute(source, Start::Fresh { owner_id }, Some(observer))
            .await
    }

    /// Continues an upload the server already knows, skipping init.
    ///
    /// `chunk_size` must be the size the upload was started with, as reported
    /// to [`UploadObserver::on_started`]. The server's descriptor cannot be
    /// trusted for it, so without it the upload is not resumable. The
    /// configured chunk size is ignored.
    pub async fn resume(
        &self,
        source: &SourceFile,
        upload_id: &str,
        chunk_size: Option<u64>,
    ) -> UploadOutcome {
        self.execute(source, Start::Resume { upload_id, chunk_size }, None)
            .await
    }

    pub async fn resume_with_observer(
        &self,
        source: &SourceFile,
        upload_id: &str,
        chunk_size: Option<u64>,
        observer: &dyn UploadObserver,
    ) -> UploadOutcome {
        self.execute(
            source,
            Start::Resume {
                upload_id,
                chunk_size,
            },
            Some(observer),
        )
        .await
    }

    async fn execute(
        &self,
        source: &SourceFile,
        start: Start<'_>,
        observer: Option<&dyn UploadObserver>,
    ) -> UploadOutcome {
        let cancel = self.cancel.begin();
        let mut reporter = ProgressReporter::new(&self.callbacks, observer);
        let mut upload_id = None;

        let result = self
            .run(source, start, &cancel, observer, &mut reporter, &mut upload_id)
            .await;
        let outcome = self
            .resolve(source, result, &cancel, upload_id.as_deref())
            .await;

        if let Some(observer) = observer {
            outcome.notify(observer);
        }
        outcome
    }

    /// Turns the pipeline result into the single terminal outcome.
    ///
    /// A set cancellation flag wins over a failure. It never undoes a merge
    /// that succeeded: the server already holds the final file.
    async fn resolve(
        &self,
        source: &SourceFile,
        result: Result<UploadReceipt, Stop>,
        cancel: &CancellationToken,
        upload_id: Option<&str>,
    ) -> UploadOutcome {
        let cancelled = match &result {
            Ok(_) => {
                if cancel.is_cancelled() {
                    debug!(file = source.file_name(), "cancel arrived after merge, keeping upload");
                }
                false
            }
            Err(Stop::Cancelled) => true,
            Err(Stop::Failed(e)) => {
                let cancelled = cancel.is_cancelled();
                if cancelled {
                    debug!(error = %e, "failure superseded by cancellation");
                }
                cancelled
            }
        };

        if cancelled {
            if let Some(id) = upload_id {
                cancel::notify_server(self.service.as_ref(), id).await;
            }
            info!(file = source.file_name(), "upload cancelled");
            return UploadOutcome::Cancelled;
        }

        match result {
            Ok(receipt) => {
                info!(
                    file = %receipt.file_name,
                    upload_id = %receipt.upload_id,
                    path = receipt.final_path.as_deref().unwrap_or(""),
                    "upload complete"
                );
                UploadOutcome::Completed(receipt)
            }
            Err(Stop::Failed(e)) => {
                error!(file = source.file_name(), error = %e, "upload failed");
                UploadOutcome::Failed(e)
            }
            Err(Stop::Cancelled) => UploadOutcome::Cancelled,
        }
    }

    async fn run(
        &self,
        source: &SourceFile,
        start: Start<'_>,
        cancel: &CancellationToken,
        observer: Option<&dyn UploadObserver>,
        reporter: &mut ProgressReporter<'_>,
        upload_id: &mut Option<String>,
    ) -> Result<UploadReceipt, Stop> {
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        // 1. Plan
        validate_upload_file(source.file_name(), source.size(), None)?;
        let chunk_size = match start {
            Start::Fresh { .. } => self.config.chunk_size,
            Start::Resume {
                upload_id,
                chunk_size,
            } => chunk_size
                .filter(|&c| c > 0)
                .ok_or_else(|| UploadError::NotResumable {
                    upload_id: upload_id.to_string(),
                    reason: "chunk size of the interrupted upload is unknown".into(),
                })?,
        };
        let plan = ChunkPlan::new(source.size(), chunk_size)?;

        if plan.is_empty() {
            if let Start::Resume { upload_id, .. } = start {
                return Err(UploadError::NotResumable {
                    upload_id: upload_id.to_string(),
                    reason: "file is empty".into(),
                }
                .into());
            }
            info!(file = source.file_name(), "empty file, nothing to transfer");
            reporter.report(ProgressSnapshot::compute(0, 0, plan.chunk_size(), 0));
            return Ok(UploadReceipt {
                upload_id: String::new(),
                file_name: source.file_name().to_string(),
                file_size: 0,
                total_chunks: 0,
                reused_chunks: 0,
                final_path: None,
                file_checksum: None,
            });
        }

        // 2. Hash
        let file_checksum = if self.config.verify_integrity {
            let digest =
                calculate_file_checksum(source.path(), self.config.chunk_size as usize, cancel)
                    .await?;
            debug!(file = source.file_name(), md5 = %digest, "file hashed");
            Some(digest)
        } else {
            None
        };

        // 3. Init or resume. These requests are awaited even if a cancel
        // arrives meanwhile, so the upload id is known for the server notice.
        let info = match start {
            Start::Fresh { owner_id } => {
                self.init(source, &plan, file_checksum.clone(), owner_id)
                    .await?
            }
            Start::Resume { upload_id, .. } => {
                self.fetch_resumable(source, upload_id, file_checksum.as_deref())
                    .await?
            }
        };
        *upload_id = Some(info.upload_id.clone());
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        // 4. Negotiate
        let plan = match start {
            Start::Fresh { .. } => negotiate_plan(plan, &info)?,
            Start::Resume { .. } => {
                check_resume_plan(&plan, &info).map_err(|reason| UploadError::NotResumable {
                    upload_id: info.upload_id.clone(),
                    reason,
                })?;
                plan
            }
        };
        if let Some(observer) = observer {
            observer.on_started(&info.upload_id, plan.chunk_size());
        }
        let mut session =
            TransferSession::new(info.upload_id, plan, file_checksum, cancel.clone());

        // 5. Probe
        let indices: Vec<usize> = (0..session.plan().len()).collect();
        let present = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Stop::Cancelled),
            present = probe_existing(self.service.as_ref(), session.upload_id(), &indices) => present,
        };
        let reused_chunks = session.seed_confirmed(present);
        if reused_chunks > 0 {
            info!(
                upload_id = session.upload_id(),
                reused = reused_chunks,
                total = session.plan().len(),
                "resuming with chunks already on server"
            );
        }
        reporter.report(session.progress());

        // 6. Transfer
        let scheduler = ChunkScheduler {
            service: self.service.as_ref(),
            source,
            retry: self.config.retry_policy(),
            max_concurrency: self.config.max_concurrency,
            verify_integrity: self.config.verify_integrity,
        };
        scheduler
            .run(&mut session, |s| reporter.report(s.progress()))
            .await?;

        // 7. Cross-check and merge
        self.cross_check(&session, cancel).await?;
        let final_path = finalize(self.service.as_ref(), &session).await?;

        Ok(UploadReceipt {
            upload_id: session.upload_id().to_string(),
            file_name: source.file_name().to_string(),
            file_size: source.size(),
            total_chunks: session.plan().len(),
            reused_chunks,
            final_path: Some(final_path),
            file_checksum: session.file_checksum().map(String::from),
        })
    }

    async fn init(
        &self,
        source: &SourceFile,
        plan: &ChunkPlan,
        md5_hash: Option<String>,
        owner_id: i64,
    ) -> Result<ChunkUploadInfo, UploadError> {
        let total_chunks = u32::try_from(plan.len())
            .map_err(|_| UploadError::Config(format!("too many chunks: {}", plan.len())))?;
        let request = InitUploadRequest {
            file_name: source.file_name().to_string(),
            file_size: source.size(),
            total_chunks,
            md5_hash,
            user_id: owner_id,
        };

        info!(
            file = %request.file_name,
            size = request.file_size,
            chunks = total_chunks,
            "initializing upload"
        );
        self.service.init(&request).await.map_err(UploadError::Init)
    }

    /// Fetches the descriptor of an existing upload and checks that it can
    /// take more chunks of this file.
    async fn fetch_resumable(
        &self,
        source: &SourceFile,
        upload_id: &str,
        file_checksum: Option<&str>,
    ) -> Result<ChunkUploadInfo, UploadError> {
        info!(upload_id, file = source.file_name(), "resuming upload");
        let mut info = self.service.progress(upload_id).await?;
        if info.upload_id.is_empty() {
            info.upload_id = upload_id.to_string();
        }

        let not_resumable = |reason: String| UploadError::NotResumable {
            upload_id: upload_id.to_string(),
            reason,
        };

        if let Some(status) = info.status.filter(|s| !s.accepts_chunks()) {
            return Err(not_resumable(format!("server status is {status}")));
        }
        if let Some(size) = info.file_size.filter(|&size| size != source.size()) {
            return Err(not_resumable(format!(
                "server expects {size} bytes, file has {}",
                source.size()
            )));
        }
        if let (Some(server), Some(local)) = (info.md5_hash.as_deref(), file_checksum) {
            if !server.eq_ignore_ascii_case(local) {
                return Err(not_resumable("file content changed".into()));
            }
        }
        Ok(info)
    }

    /// Compares the server's uploaded count with ours. Disagreement is
    /// logged; the merge decides.
    async fn cross_check(
        &self,
        session: &TransferSession,
        cancel: &CancellationToken,
    ) -> Result<(), Stop> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Stop::Cancelled),
            result = self.service.progress(session.upload_id()) => result,
        };

        match result {
            Ok(info) => {
                if let Some(server) = info.uploaded_chunks {
                    if server as usize != session.confirmed_count() {
                        warn!(
                            upload_id = session.upload_id(),
                            server,
                            local = session.confirmed_count(),
                            "server chunk count disagrees with local count"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(upload_id = session.upload_id(), error = %e, "server progress check failed");
            }
        }
        Ok(())
    }
}

/// Adopts the server's chunking when its count differs from the local plan.
fn negotiate_plan(plan: ChunkPlan, info: &ChunkUploadInfo) -> Result<ChunkPlan, UploadError> {
    let Some(server_total) = info.total_chunks.map(|t| t as usize) else {
        return Ok(plan);
    };
    if server_total == plan.len() {
        return Ok(plan);
    }

    let chunk_size = info.chunk_size.filter(|&c| c > 0).ok_or_else(|| {
        UploadError::PlanMismatch(format!(
            "server expects {server_total} chunks but sent no chunk size"
        ))
    })?;
    let replanned = ChunkPlan::new(plan.file_size(), chunk_size)?;
    if replanned.len() != server_total {
        return Err(UploadError::PlanMismatch(format!(
            "server expects {server_total} chunks of {chunk_size} bytes, file splits into {}",
            replanned.len()
        )));
    }

    info!(
        chunk_size,
        chunks = server_total,
        local_chunks = plan.len(),
        "adopting server chunk size"
    );
    Ok(replanned)
}

/// Checks that a resumed upload splits the file the way the server's
/// chunks were cut.
///
/// The server reports `ceil(file_size / total_chunks)` as its chunk size, so
/// either that value or the recorded size is accepted.
fn check_resume_plan(plan: &ChunkPlan, info: &ChunkUploadInfo) -> Result<(), String> {
    let total = plan.len();
    if let Some(server_total) = info.total_chunks.map(|t| t as usize) {
        if server_total != total {
            return Err(format!(
                "server holds {server_total} chunks, file splits into {total} chunks of {} bytes",
                plan.chunk_size()
            ));
        }
    }

    if let Some(server_size) = info.chunk_size {
        let derived = plan.file_size().div_ceil(total as u64);
        if server_size != plan.chunk_size() && server_size != derived {
            return Err(format!(
                "server chunk size {server_size} does not match recorded size {}",
                plan.chunk_size()
            ));
        }
    }
    Ok(())
}
