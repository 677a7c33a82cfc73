//! Server-side existence checks for resume.

use std::collections::BTreeSet;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::service::UploadService;

/// Asks the server about every index at once and returns the ones it holds.
///
/// A failed probe counts as "not present" and never stops the others.
pub(crate) async fn probe_existing(
    service: &dyn UploadService,
    upload_id: &str,
    indices: &[usize],
) -> BTreeSet<usize> {
    let probes = indices.iter().map(|&index| async move {
        match service.exists(upload_id, index).await {
            Ok(present) => present.then_some(index),
            Err(e) => {
                warn!(upload_id, index, error = %e, "chunk probe failed, treating as missing");
                None
            }
        }
    });

    let present: BTreeSet<usize> = join_all(probes).await.into_iter().flatten().collect();
    debug!(
        upload_id,
        probed = indices.len(),
        present = present.len(),
        "resume probe complete"
    );
    present
}
