//! Bounded-concurrency chunk pipeline.
//!
//! All in-flight transfers are polled together on the calling task; nothing
//! is spawned except the blocking file reads. Completion, confirmation,
//! progress report and the next admission happen as one step, so progress is
//! reported in confirmation order.

use std::collections::VecDeque;

use chunkflow_transfer::{Chunk, SourceFile, TransferError, TransferSession, checksum_bytes};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ChunkError, Stop, UploadError};
use crate::retry::{RetryError, RetryPolicy};
use crate::service::{ChunkUpload, UploadService};

pub(crate) struct ChunkScheduler<'a> {
    pub service: &'a dyn UploadService,
    pub source: &'a SourceFile,
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
    pub verify_integrity: bool,
}

impl ChunkScheduler<'_> {
    /// Transfers every unconfirmed chunk of `session`.
    ///
    /// `on_confirm` runs after each confirmation, before the next admission.
    /// Once the session's token is cancelled no new chunk is admitted; the
    /// transfers already running are awaited and their results discarded.
    pub async fn run<F>(&self, session: &mut TransferSession, mut on_confirm: F) -> Result<(), Stop>
    where
        F: FnMut(&TransferSession),
    {
        let mut pending: VecDeque<Chunk> = session
            .pending()
            .into_iter()
            .filter_map(|index| session.plan().get(index).copied())
            .collect();
        let upload_id = session.upload_id().to_string();
        let cancel = session.cancel_token().clone();
        let limit = self.max_concurrency.max(1);

        debug!(
            upload_id = %upload_id,
            pending = pending.len(),
            limit,
            "scheduling chunks"
        );

        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < limit && !cancel.is_cancelled() {
                let Some(chunk) = pending.pop_front() else {
                    break;
                };
                in_flight.push(self.transfer(&upload_id, chunk, &cancel));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drain(&mut in_flight).await;
                    return Err(Stop::Cancelled);
                }
                Some(result) = in_flight.next() => match result {
                    Ok(index) => {
                        session.confirm(index).map_err(UploadError::Transfer)?;
                        on_confirm(session);
                    }
                    Err((_, RetryError::Cancelled)) => {
                        drain(&mut in_flight).await;
                        return Err(Stop::Cancelled);
                    }
                    Err((index, RetryError::Exhausted { attempts, last })) => {
                        return Err(Stop::Failed(UploadError::ChunkFailed {
                            index,
                            attempts,
                            source: last,
                        }));
                    }
                },
            }
        }

        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    /// Uploads one chunk under the retry policy. Each attempt re-reads the
    /// bytes and recomputes the digest.
    async fn transfer(
        &self,
        upload_id: &str,
        chunk: Chunk,
        cancel: &CancellationToken,
    ) -> Result<usize, (usize, RetryError<ChunkError>)> {
        self.retry
            .run(cancel, move |attempt| async move {
                let (data, md5) = self.read(chunk).await?;
                debug!(
                    upload_id,
                    index = chunk.index,
                    attempt,
                    bytes = data.len(),
                    "uploading chunk"
                );
                self.service
                    .upload_chunk(ChunkUpload {
                        upload_id: upload_id.to_string(),
                        index: chunk.index,
                        data,
                        md5,
                    })
                    .await?;
                Ok::<_, ChunkError>(chunk.index)
            })
            .await
            .map_err(|e| (chunk.index, e))
    }

    async fn read(&self, chunk: Chunk) -> Result<(Vec<u8>, Option<String>), ChunkError> {
        let source = self.source.clone();
        let verify = self.verify_integrity;
        let read = tokio::task::spawn_blocking(move || {
            let data = source.read_chunk(&chunk)?;
            let md5 = verify.then(|| checksum_bytes(&data));
            Ok::<_, TransferError>((data, md5))
        })
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?;
        Ok(read?)
    }
}

/// Waits for already-dispatched transfers without acting on their results.
async fn drain<S>(in_flight: &mut S)
where
    S: futures_util::Stream + Unpin,
{
    let mut abandoned = 0usize;
    while in_flight.next().await.is_some() {
        abandoned += 1;
    }
    if abandoned > 0 {
        warn!(abandoned, "ignored results of in-flight chunks after cancellation");
    }
}
