/*!
Generation-count pruning of a snapshot inventory.

The surplus is counted against the declared generation target, never against
elapsed time: an inventory of length L with target N loses its `L - N`
oldest entries.
*/

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::config::RotationConfig;
use crate::model::Snapshot;
use crate::provider::ComputeProvider;
use crate::{Result, RotateError};

/// Surplus entries of an oldest-first inventory once `keep` generations are
/// retained. A target at or above the inventory length selects nothing.
pub fn expired(inventory: &[Snapshot], keep: u32) -> &[Snapshot] {
    let surplus = inventory.len().saturating_sub(keep as usize);
    &inventory[..surplus]
}

/// Delete every surplus snapshot of an oldest-first inventory.
///
/// Deletions are independent and issued concurrently up to
/// `config.max_in_flight`; the first failure cancels the rest of the batch.
/// Returns the number of snapshots deleted.
pub async fn prune<P>(
    provider: &P,
    config: &RotationConfig,
    inventory: &[Snapshot],
    keep: u32,
) -> Result<usize>
where
    P: ComputeProvider + ?Sized,
{
    let doomed = expired(inventory, keep);
    if doomed.is_empty() {
        debug!(keep, inventory = inventory.len(), "no surplus snapshots");
        return Ok(0);
    }

    info!(keep, surplus = doomed.len(), "pruning surplus snapshots");
    stream::iter(doomed)
        .map(Ok::<_, RotateError>)
        .try_for_each_concurrent(config.max_in_flight, |snapshot| async move {
            provider
                .delete_snapshot(&snapshot.snapshot_id)
                .await
                .map_err(|e| {
                    RotateError::delete_failed(snapshot.snapshot_id.as_str(), e.to_string())
                })
        })
        .await?;

    Ok(doomed.len())
}
