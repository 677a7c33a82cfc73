use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use crate::TransferError;
use crate::plan::ChunkPlan;
use crate::progress::ProgressSnapshot;

/// State of one upload invocation: the server-issued id, the chunk plan and
/// the set of chunks the server has confirmed.
///
/// `confirmed` only grows. The session owns a cancellation token that may be
/// shared with a cancel handle; once cancelled it stays cancelled.
#[derive(Debug)]
pub struct TransferSession {
    upload_id: String,
    plan: ChunkPlan,
    confirmed: BTreeSet<usize>,
    file_checksum: Option<String>,
    cancel: CancellationToken,
}

impl TransferSession {
    pub fn new(
        upload_id: impl Into<String>,
        plan: ChunkPlan,
        file_checksum: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            plan,
            confirmed: BTreeSet::new(),
            file_checksum,
            cancel,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Whole-file digest, if hashing was enabled.
    pub fn file_checksum(&self) -> Option<&str> {
        self.file_checksum.as_deref()
    }

    /// Marks a chunk as persisted by the server.
    ///
    /// Returns `true` if the chunk was newly confirmed.
    pub fn confirm(&mut self, index: usize) -> Result<bool, TransferError> {
        if index >= self.plan.len() {
            return Err(TransferError::ChunkOutOfRange {
                index,
                total: self.plan.len(),
            });
        }
        Ok(self.confirmed.insert(index))
    }

    /// Bulk-confirms chunks found on the server. Indices outside the plan are
    /// ignored. Returns how many were newly confirmed.
    pub fn seed_confirmed(&mut self, indices: impl IntoIterator<Item = usize>) -> usize {
        let total = self.plan.len();
        indices
            .into_iter()
            .filter(|&i| i < total)
            .filter(|&i| self.confirmed.insert(i))
            .count()
    }

    pub fn is_confirmed(&self, index: usize) -> bool {
        self.confirmed.contains(&index)
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Unconfirmed chunk indices in ascending order.
    pub fn pending(&self) -> Vec<usize> {
        (0..self.plan.len())
            .filter(|i| !self.confirmed.contains(i))
            .collect()
    }

    /// All chunks confirmed.
    pub fn is_complete(&self) -> bool {
        self.confirmed.len() == self.plan.len()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot::compute(
            self.confirmed.len(),
            self.plan.len(),
            self.plan.chunk_size(),
            self.plan.file_size(),
        )
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
