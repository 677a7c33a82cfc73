//! Server-side merge once every chunk is confirmed.

use chunkflow_transfer::TransferSession;
use tracing::info;

use crate::error::{Stop, UploadError};
use crate::service::UploadService;

/// Merges the upload and returns the final path.
///
/// Refuses to run when cancelled or when chunks are missing. A failed merge
/// is fatal and not retried. The merge request itself is not interrupted by
/// a late cancellation.
pub(crate) async fn finalize(
    service: &dyn UploadService,
    session: &TransferSession,
) -> Result<String, Stop> {
    if session.is_cancelled() {
        return Err(Stop::Cancelled);
    }
    if !session.is_complete() {
        return Err(Stop::Failed(UploadError::Incomplete {
            confirmed: session.confirmed_count(),
            total: session.plan().len(),
        }));
    }

    info!(upload_id = session.upload_id(), chunks = session.plan().len(), "merging chunks");
    service
        .merge(session.upload_id())
        .await
        .map_err(|e| Stop::Failed(UploadError::Finalize(e)))
}
