/*!
Snapshot creation and labeling for create-eligible instances.
*/

use tracing::{debug, info};

use crate::config::RotationConfig;
use crate::model::Instance;
use crate::provider::ComputeProvider;
use crate::{Result, RotateError};

/// Create and label one snapshot of `instance`'s primary volume.
///
/// `date_stamp` is computed once per run and shared by every snapshot the
/// run creates. The snapshot is requested first and labeled second, so a
/// labeling failure leaves the snapshot behind untagged; nothing is rolled
/// back. Returns the provider-issued snapshot id.
pub async fn create_snapshot<P>(
    provider: &P,
    config: &RotationConfig,
    instance: &Instance,
    date_stamp: &str,
) -> Result<String>
where
    P: ComputeProvider + ?Sized,
{
    let volume_id = instance.primary_volume_id.as_deref().ok_or_else(|| {
        RotateError::create_failed(instance.instance_id.as_str(), "instance has no primary volume")
    })?;

    let description = format!("Snapshot that was created from the volume ID {volume_id}.");
    debug!(instance_id = %instance.instance_id, volume_id, "creating snapshot");
    let snapshot_id = provider
        .create_snapshot(volume_id, &description)
        .await
        .map_err(|e| RotateError::create_failed(instance.instance_id.as_str(), e.to_string()))?;

    let name = instance.tag(&config.name_tag).ok_or_else(|| {
        RotateError::create_failed(
            instance.instance_id.as_str(),
            format!("instance has no {} tag", config.name_tag),
        )
    })?;

    let tags = [
        (config.name_tag.clone(), format!("{name}-{date_stamp}")),
        (config.marker_tag.clone(), config.marker_value.clone()),
    ];
    provider
        .tag_resource(&snapshot_id, &tags)
        .await
        .map_err(|e| RotateError::create_failed(instance.instance_id.as_str(), e.to_string()))?;

    info!(
        instance_id = %instance.instance_id,
        snapshot_id = %snapshot_id,
        "snapshot created and labeled"
    );
    Ok(snapshot_id)
}
