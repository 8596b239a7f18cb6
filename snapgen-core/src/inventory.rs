/*!
Inventory of automation-owned snapshots for one instance's volume.
*/

use tracing::debug;

use crate::config::RotationConfig;
use crate::model::{Instance, Snapshot};
use crate::provider::ComputeProvider;
use crate::{Result, RotateError};

/// Managed snapshots of `instance`'s primary volume, oldest first.
///
/// Only snapshots carrying the managed-marker tag are visible here, which is
/// the sole mechanism keeping manually created snapshots out of the pruner's
/// reach. An empty inventory is not an error.
pub async fn managed_snapshots<P>(
    provider: &P,
    config: &RotationConfig,
    instance: &Instance,
) -> Result<Vec<Snapshot>>
where
    P: ComputeProvider + ?Sized,
{
    let volume_id = instance.primary_volume_id.as_deref().ok_or_else(|| {
        RotateError::inventory_failed(
            instance.instance_id.as_str(),
            "instance has no primary volume",
        )
    })?;

    let mut snapshots = provider
        .list_snapshots(volume_id, &config.marker_tag, &config.marker_value)
        .await
        .map_err(|e| RotateError::inventory_failed(instance.instance_id.as_str(), e.to_string()))?;

    // Stable sort: equal timestamps keep provider order within a run.
    snapshots.sort_by_key(|snapshot| snapshot.started_at);

    debug!(
        instance_id = %instance.instance_id,
        volume_id,
        count = snapshots.len(),
        "managed snapshot inventory"
    );
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use chrono::DateTime;

    fn instance() -> Instance {
        Instance::new("i-1")
            .with_tag("Snapshot-Generation", "1")
            .with_primary_volume("vol-1")
    }

    fn marked(id: &str, secs: i64) -> Snapshot {
        Snapshot::new(id, "vol-1", DateTime::from_timestamp(secs, 0).unwrap())
            .with_tag("Auto-Snapshot", "true")
    }

    #[tokio::test]
    async fn orders_ascending_by_start_time() {
        let provider = MemoryProvider::new();
        provider.add_snapshot(marked("snap-t3", 3_000));
        provider.add_snapshot(marked("snap-t1", 1_000));
        provider.add_snapshot(marked("snap-t2", 2_000));

        let config = RotationConfig::default();
        let inventory = managed_snapshots(&provider, &config, &instance())
            .await
            .unwrap();

        let ids: Vec<&str> = inventory
            .iter()
            .map(|snapshot| snapshot.snapshot_id.as_str())
            .collect();
        assert_eq!(ids, ["snap-t1", "snap-t2", "snap-t3"]);
    }

    #[tokio::test]
    async fn unmarked_snapshots_are_invisible() {
        let provider = MemoryProvider::new();
        provider.add_snapshot(marked("snap-managed", 1_000));
        provider.add_snapshot(Snapshot::new(
            "snap-manual",
            "vol-1",
            DateTime::from_timestamp(2_000, 0).unwrap(),
        ));

        let config = RotationConfig::default();
        let inventory = managed_snapshots(&provider, &config, &instance())
            .await
            .unwrap();

        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].snapshot_id, "snap-managed");
    }

    #[tokio::test]
    async fn empty_inventory_is_fine() {
        let provider = MemoryProvider::new();
        let config = RotationConfig::default();
        let inventory = managed_snapshots(&provider, &config, &instance())
            .await
            .unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn missing_primary_volume_is_an_inventory_failure() {
        let provider = MemoryProvider::new();
        let config = RotationConfig::default();
        let bare = Instance::new("i-1").with_tag("Snapshot-Generation", "1");

        let result = managed_snapshots(&provider, &config, &bare).await;
        assert!(matches!(
            result,
            Err(RotateError::InventoryFailed { instance_id, .. }) if instance_id == "i-1"
        ));
    }
}
