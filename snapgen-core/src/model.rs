/*!
Domain model for instances and their managed snapshots.

Both types are provider-owned data read once per run; the engine never
mutates an instance and only ever writes snapshot tags through the provider.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A compute instance as enumerated for one rotation run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Instance {
    /// Provider-issued instance identifier
    pub instance_id: String,

    /// Metadata tags. Duplicate keys are a provider invariant and not
    /// expected, so a plain map with first-match lookup is enough.
    pub tags: HashMap<String, String>,

    /// Volume backing the instance's first block device, if any
    pub primary_volume_id: Option<String>,
}

impl Instance {
    /// Create an instance with no tags and no volume
    pub fn new<S: Into<String>>(instance_id: S) -> Self {
        Self {
            instance_id: instance_id.into(),
            tags: HashMap::new(),
            primary_volume_id: None,
        }
    }

    /// Attach a tag
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Attach the primary volume reference
    pub fn with_primary_volume<S: Into<String>>(mut self, volume_id: S) -> Self {
        self.primary_volume_id = Some(volume_id.into());
        self
    }

    /// Look up a tag value by key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// A point-in-time copy of a volume, as reported by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Provider-issued snapshot identifier
    pub snapshot_id: String,

    /// Volume the snapshot was taken from
    pub volume_id: String,

    /// When the provider started the snapshot
    pub started_at: DateTime<Utc>,

    /// Snapshot tags, including the managed-marker tag for snapshots owned
    /// by the rotation automation
    pub tags: HashMap<String, String>,
}

impl Snapshot {
    /// Create a snapshot record with no tags
    pub fn new<S1, S2>(snapshot_id: S1, volume_id: S2, started_at: DateTime<Utc>) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            snapshot_id: snapshot_id.into(),
            volume_id: volume_id.into(),
            started_at,
            tags: HashMap::new(),
        }
    }

    /// Attach a tag
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Look up a tag value by key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_tag_lookup() {
        let instance = Instance::new("i-0abc")
            .with_tag("Name", "web01")
            .with_tag("Snapshot-Generation", "3")
            .with_primary_volume("vol-0def");

        assert_eq!(instance.tag("Name"), Some("web01"));
        assert_eq!(instance.tag("Snapshot-Generation"), Some("3"));
        assert_eq!(instance.tag("Team"), None);
        assert_eq!(instance.primary_volume_id.as_deref(), Some("vol-0def"));
    }

    #[test]
    fn snapshot_tag_lookup() {
        let started = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let snapshot = Snapshot::new("snap-1", "vol-1", started).with_tag("Auto-Snapshot", "true");

        assert_eq!(snapshot.tag("Auto-Snapshot"), Some("true"));
        assert_eq!(snapshot.tag("Name"), None);
        assert_eq!(snapshot.started_at, started);
    }
}
