/*!
In-memory provider used by the test-suite and for offline rehearsal.

Implements the provider contract closely enough to drive full rotation runs:
snapshot ids and timestamps are minted deterministically, and individual
operations can be armed to fail for abort-semantics tests.
*/

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Instance, Snapshot};
use crate::provider::ComputeProvider;
use crate::{Result, RotateError};

/// Base of the fake clock; minted snapshots are stamped one second apart.
const CLOCK_BASE_SECS: i64 = 1_700_000_000;

#[derive(Default)]
struct State {
    instances: Vec<Instance>,
    snapshots: Vec<Snapshot>,
    descriptions: Vec<(String, String)>,
    next_seq: i64,
    fail_create_volumes: HashSet<String>,
    fail_delete_snapshots: HashSet<String>,
}

/// In-memory [`ComputeProvider`] fake.
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance for enumeration
    pub fn add_instance(&self, instance: Instance) {
        self.lock().instances.push(instance);
    }

    /// Seed a pre-existing snapshot with the timestamp it carries
    pub fn add_snapshot(&self, snapshot: Snapshot) {
        self.lock().snapshots.push(snapshot);
    }

    /// Arm every snapshot request against `volume_id` to fail
    pub fn fail_creates_for(&self, volume_id: &str) {
        self.lock().fail_create_volumes.insert(volume_id.to_string());
    }

    /// Arm deletion of `snapshot_id` to fail
    pub fn fail_delete_of(&self, snapshot_id: &str) {
        self.lock()
            .fail_delete_snapshots
            .insert(snapshot_id.to_string());
    }

    /// Current snapshots, in insertion order
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.lock().snapshots.clone()
    }

    /// Ids of the current snapshots, in insertion order
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.lock()
            .snapshots
            .iter()
            .map(|snapshot| snapshot.snapshot_id.clone())
            .collect()
    }

    /// Descriptions passed to the create calls, paired with the minted id
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.lock().descriptions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory provider state poisoned")
    }
}

#[async_trait]
impl ComputeProvider for MemoryProvider {
    async fn list_instances(&self, tag_key: &str) -> Result<Vec<Instance>> {
        let state = self.lock();
        Ok(state
            .instances
            .iter()
            .filter(|instance| instance.tags.contains_key(tag_key))
            .cloned()
            .collect())
    }

    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String> {
        let mut state = self.lock();
        if state.fail_create_volumes.contains(volume_id) {
            return Err(RotateError::provider(format!(
                "snapshot quota exceeded for volume {volume_id}"
            )));
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        let snapshot_id = format!("snap-{seq:04}");
        let started_at = DateTime::from_timestamp(CLOCK_BASE_SECS + seq, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        state
            .snapshots
            .push(Snapshot::new(snapshot_id.clone(), volume_id, started_at));
        state
            .descriptions
            .push((snapshot_id.clone(), description.to_string()));
        Ok(snapshot_id)
    }

    async fn tag_resource(&self, resource_id: &str, tags: &[(String, String)]) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state
            .snapshots
            .iter_mut()
            .find(|snapshot| snapshot.snapshot_id == resource_id)
            .ok_or_else(|| RotateError::provider(format!("resource {resource_id} not found")))?;

        for (key, value) in tags {
            snapshot.tags.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_snapshots(
        &self,
        volume_id: &str,
        marker_key: &str,
        marker_value: &str,
    ) -> Result<Vec<Snapshot>> {
        let state = self.lock();
        Ok(state
            .snapshots
            .iter()
            .filter(|snapshot| {
                snapshot.volume_id == volume_id && snapshot.tag(marker_key) == Some(marker_value)
            })
            .cloned()
            .collect())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_delete_snapshots.contains(snapshot_id) {
            return Err(RotateError::provider(format!(
                "snapshot {snapshot_id} is in use"
            )));
        }

        let before = state.snapshots.len();
        state
            .snapshots
            .retain(|snapshot| snapshot.snapshot_id != snapshot_id);
        if state.snapshots.len() == before {
            return Err(RotateError::provider(format!(
                "snapshot {snapshot_id} not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumeration_filters_on_tag_key() {
        let provider = MemoryProvider::new();
        provider.add_instance(Instance::new("i-1").with_tag("Snapshot-Generation", "2"));
        provider.add_instance(Instance::new("i-2").with_tag("Name", "untracked"));

        let instances = provider.list_instances("Snapshot-Generation").await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_id, "i-1");
    }

    #[tokio::test]
    async fn listing_filters_on_marker_tag() {
        let provider = MemoryProvider::new();
        let started = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        provider.add_snapshot(
            Snapshot::new("snap-a", "vol-1", started).with_tag("Auto-Snapshot", "true"),
        );
        provider.add_snapshot(Snapshot::new("snap-b", "vol-1", started));
        provider.add_snapshot(
            Snapshot::new("snap-c", "vol-2", started).with_tag("Auto-Snapshot", "true"),
        );

        let snapshots = provider
            .list_snapshots("vol-1", "Auto-Snapshot", "true")
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].snapshot_id, "snap-a");
    }

    #[tokio::test]
    async fn tagging_unknown_resource_fails() {
        let provider = MemoryProvider::new();
        let result = provider
            .tag_resource("snap-missing", &[("Name".to_string(), "x".to_string())])
            .await;
        assert!(matches!(result, Err(RotateError::Provider(_))));
    }

    #[tokio::test]
    async fn armed_deletion_fails() {
        let provider = MemoryProvider::new();
        let started = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        provider.add_snapshot(Snapshot::new("snap-a", "vol-1", started));
        provider.fail_delete_of("snap-a");

        let result = provider.delete_snapshot("snap-a").await;
        assert!(matches!(result, Err(RotateError::Provider(_))));
        assert_eq!(provider.snapshot_ids(), vec!["snap-a"]);
    }
}
