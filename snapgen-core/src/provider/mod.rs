/*!
Provider abstraction for the compute/storage control plane.

The engine only ever talks to the provider through [`ComputeProvider`]
(the port); concrete adapters implement it for the EC2 control plane and for
an in-memory fake used by tests.
*/

use async_trait::async_trait;

use crate::model::{Instance, Snapshot};
use crate::Result;

#[cfg(feature = "ec2")]
pub mod ec2;
pub mod memory;

/// Control-plane surface the rotation engine consumes.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// All instances carrying `tag_key`, regardless of the tag's value
    async fn list_instances(&self, tag_key: &str) -> Result<Vec<Instance>>;

    /// Request a new snapshot of `volume_id`; returns the provider-issued
    /// snapshot id
    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String>;

    /// Apply `tags` to an existing resource
    async fn tag_resource(&self, resource_id: &str, tags: &[(String, String)]) -> Result<()>;

    /// Snapshots of `volume_id` carrying the marker tag, in provider order
    async fn list_snapshots(
        &self,
        volume_id: &str,
        marker_key: &str,
        marker_value: &str,
    ) -> Result<Vec<Snapshot>>;

    /// Delete one snapshot
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;
}

// Re-export adapters for convenience
#[cfg(feature = "ec2")]
pub use ec2::Ec2Provider;
pub use memory::MemoryProvider;
