/*!
Amazon EC2 provider adapter.

This adapter drives the EC2 control plane through the official AWS SDK and
the standard credential provider chain:
1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN)
2. AWS credentials file (~/.aws/credentials)
3. IAM roles for EC2 instances
4. ECS task roles

Errors are never retried here: any SDK failure maps straight into a
[`RotateError`] and aborts the run.
*/

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{Filter, Tag};
use aws_sdk_ec2::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::{Instance, Snapshot};
use crate::provider::ComputeProvider;
use crate::{Result, RotateError};

/// EC2-backed [`ComputeProvider`].
#[derive(Debug, Clone)]
pub struct Ec2Provider {
    client: Client,
}

impl Ec2Provider {
    /// Build a provider from the ambient AWS environment.
    ///
    /// # Errors
    /// Returns an error if no credentials are resolvable from the provider
    /// chain.
    pub async fn new() -> Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        if sdk_config.credentials_provider().is_none() {
            return Err(RotateError::provider(
                "AWS credentials not found; set AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and \
                 AWS_REGION or run under an instance role",
            ));
        }

        info!("initialized EC2 provider");
        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }

    /// Build a provider from an explicit SDK configuration.
    pub fn with_config(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    async fn list_instances(&self, tag_key: &str) -> Result<Vec<Instance>> {
        debug!(tag_key, "describing instances");
        let filter = Filter::builder().name("tag-key").values(tag_key).build();

        let mut pages = self
            .client
            .describe_instances()
            .filters(filter)
            .into_paginator()
            .send();

        let mut instances = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_ec2_error("describe_instances", e, tag_key))?;
            for reservation in page.reservations() {
                for sdk_instance in reservation.instances() {
                    if let Some(instance) = instance_from_sdk(sdk_instance) {
                        instances.push(instance);
                    }
                }
            }
        }

        debug!(tag_key, count = instances.len(), "described instances");
        Ok(instances)
    }

    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String> {
        debug!(volume_id, "requesting snapshot");
        let output = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .description(description)
            .send()
            .await
            .map_err(|e| map_ec2_error("create_snapshot", e, volume_id))?;

        let snapshot_id = output
            .snapshot_id()
            .ok_or_else(|| {
                RotateError::provider(format!(
                    "create_snapshot response for volume {volume_id} carried no snapshot id"
                ))
            })?
            .to_string();

        info!(volume_id, snapshot_id = %snapshot_id, "snapshot requested");
        Ok(snapshot_id)
    }

    async fn tag_resource(&self, resource_id: &str, tags: &[(String, String)]) -> Result<()> {
        debug!(resource_id, count = tags.len(), "tagging resource");
        let mut request = self.client.create_tags().resources(resource_id);
        for (key, value) in tags {
            request = request.tags(Tag::builder().key(key.as_str()).value(value.as_str()).build());
        }

        request
            .send()
            .await
            .map_err(|e| map_ec2_error("create_tags", e, resource_id))?;
        Ok(())
    }

    async fn list_snapshots(
        &self,
        volume_id: &str,
        marker_key: &str,
        marker_value: &str,
    ) -> Result<Vec<Snapshot>> {
        debug!(volume_id, "describing managed snapshots");
        let volume_filter = Filter::builder().name("volume-id").values(volume_id).build();
        let marker_filter = Filter::builder()
            .name(format!("tag:{marker_key}"))
            .values(marker_value)
            .build();

        let mut pages = self
            .client
            .describe_snapshots()
            .filters(volume_filter)
            .filters(marker_filter)
            .into_paginator()
            .send();

        let mut snapshots = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_ec2_error("describe_snapshots", e, volume_id))?;
            for sdk_snapshot in page.snapshots() {
                if let Some(snapshot) = snapshot_from_sdk(sdk_snapshot, volume_id) {
                    snapshots.push(snapshot);
                }
            }
        }

        debug!(volume_id, count = snapshots.len(), "described managed snapshots");
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        debug!(snapshot_id, "deleting snapshot");
        self.client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .map_err(|e| map_ec2_error("delete_snapshot", e, snapshot_id))?;

        info!(snapshot_id, "snapshot deleted");
        Ok(())
    }
}

fn instance_from_sdk(instance: &aws_sdk_ec2::types::Instance) -> Option<Instance> {
    let instance_id = instance.instance_id()?.to_string();
    let primary_volume_id = instance
        .block_device_mappings()
        .first()
        .and_then(|mapping| mapping.ebs())
        .and_then(|ebs| ebs.volume_id())
        .map(str::to_string);

    Some(Instance {
        instance_id,
        tags: tag_map(instance.tags()),
        primary_volume_id,
    })
}

fn snapshot_from_sdk(snapshot: &aws_sdk_ec2::types::Snapshot, volume_id: &str) -> Option<Snapshot> {
    let snapshot_id = snapshot.snapshot_id()?.to_string();
    // A snapshot the control plane reports without a start time sorts as
    // oldest and is pruned first.
    let started_at = snapshot
        .start_time()
        .and_then(|time| DateTime::from_timestamp(time.secs(), time.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Some(Snapshot {
        snapshot_id,
        volume_id: snapshot.volume_id().unwrap_or(volume_id).to_string(),
        started_at,
        tags: tag_map(snapshot.tags()),
    })
}

fn tag_map(tags: &[Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|tag| {
            Some((
                tag.key()?.to_string(),
                tag.value().unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

/// Map AWS SDK errors to [`RotateError`] with operation context.
fn map_ec2_error<E>(op: &str, error: SdkError<E>, resource: &str) -> RotateError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    match &error {
        SdkError::DispatchFailure(dispatch_err) => RotateError::provider(format!(
            "EC2 {op} request failed to dispatch: {dispatch_err:?}"
        )),
        SdkError::TimeoutError(_) => {
            RotateError::provider(format!("EC2 {op} request timed out ({resource})"))
        }
        SdkError::ResponseError(response_err) => {
            RotateError::provider(format!("EC2 {op} response error: {response_err:?}"))
        }
        SdkError::ServiceError(service_err) => {
            let err = service_err.err();
            match err.code() {
                Some("InvalidVolume.NotFound") => {
                    RotateError::provider(format!("volume {resource} not found"))
                }
                Some("InvalidSnapshot.NotFound") => {
                    RotateError::provider(format!("snapshot {resource} not found"))
                }
                Some("InvalidSnapshot.InUse") => {
                    RotateError::provider(format!("snapshot {resource} is in use"))
                }
                Some(code @ ("RequestLimitExceeded" | "SnapshotCreationPerVolumeRateExceeded"
                | "SnapshotLimitExceeded")) => RotateError::provider(format!(
                    "EC2 {op} throttled ({code}): {}",
                    err.message().unwrap_or("request limit reached")
                )),
                Some("UnauthorizedOperation") => RotateError::provider(format!(
                    "not authorized for EC2 {op} (check the execution role's permissions)"
                )),
                Some(code) => RotateError::provider(format!(
                    "EC2 {op} service error ({code}): {}",
                    err.message().unwrap_or("unknown error")
                )),
                None => {
                    RotateError::provider(format!("EC2 {op} service error: {service_err:?}"))
                }
            }
        }
        _ => RotateError::provider(format!("EC2 {op} error: {error}")),
    }
}
