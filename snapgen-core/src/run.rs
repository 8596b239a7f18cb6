/*!
Run coordination: one pass over the instance population per trigger event.

A run walks Enumerate → FilterCreate → CreatePhase → FilterPrune →
PrunePhase. Per-instance work inside a phase fans out concurrently up to the
configured bound; phases never overlap, and the first failure anywhere
cancels the rest of the run. Nothing survives a run except the snapshots it
created or deleted at the provider.
*/

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::config::RotationConfig;
use crate::model::Instance;
use crate::policy::{self, Disposition};
use crate::provider::ComputeProvider;
use crate::{creator, inventory, pruner, Result, RotateError};

/// Retention policy engine bound to one provider.
pub struct RotationEngine<P: ComputeProvider> {
    provider: P,
    config: RotationConfig,
}

impl<P: ComputeProvider> RotationEngine<P> {
    /// Build an engine over `provider` with a validated configuration.
    pub fn new(provider: P, config: RotationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    /// The provider this engine drives.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Execute one rotation run, stamping snapshot names with the current
    /// date in the configured reference timezone.
    pub async fn run(&self) -> Result<()> {
        self.run_at(Utc::now()).await
    }

    /// Execute one rotation run as if started at `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<()> {
        let date_stamp = self.config.date_stamp(now);
        info!(date_stamp = %date_stamp, "starting snapshot rotation run");

        let instances = self
            .provider
            .list_instances(&self.config.declaration_tag)
            .await?;
        if instances.is_empty() {
            info!("no instances carry the declaration tag; nothing to do");
            return Ok(());
        }
        info!(count = instances.len(), "enumerated declared instances");

        let mut create_set = Vec::new();
        let mut prune_set = Vec::new();
        for instance in &instances {
            let disposition = policy::resolve(instance, &self.config)?;
            if disposition.create_eligible() {
                create_set.push(instance);
            }
            if disposition.prune_eligible() {
                prune_set.push((instance, disposition));
            }
        }

        self.create_phase(&create_set, &date_stamp).await?;
        self.prune_phase(&prune_set).await?;

        info!("snapshot rotation run finished");
        Ok(())
    }

    async fn create_phase(&self, create_set: &[&Instance], date_stamp: &str) -> Result<()> {
        if create_set.is_empty() {
            info!("no instances eligible for snapshot creation");
            return Ok(());
        }

        info!(count = create_set.len(), "starting create phase");
        let provider = &self.provider;
        let config = &self.config;
        stream::iter(create_set.iter().copied())
            .map(Ok::<_, RotateError>)
            .try_for_each_concurrent(config.max_in_flight, |instance| async move {
                creator::create_snapshot(provider, config, instance, date_stamp)
                    .await
                    .map(drop)
            })
            .await?;
        info!("finished create phase");
        Ok(())
    }

    async fn prune_phase(&self, prune_set: &[(&Instance, Disposition)]) -> Result<()> {
        if prune_set.is_empty() {
            info!("no instances eligible for pruning");
            return Ok(());
        }

        info!(count = prune_set.len(), "starting prune phase");
        let provider = &self.provider;
        let config = &self.config;
        stream::iter(prune_set.iter().copied())
            .map(Ok::<_, RotateError>)
            .try_for_each_concurrent(config.max_in_flight, |(instance, disposition)| async move {
                // The inventory must complete before this instance's
                // deletions start.
                let inventory = inventory::managed_snapshots(provider, config, instance).await?;
                match disposition.retain_target() {
                    Some(keep) => {
                        let deleted = pruner::prune(provider, config, &inventory, keep).await?;
                        info!(
                            instance_id = %instance.instance_id,
                            keep,
                            deleted,
                            "instance pruned"
                        );
                    }
                    None => {
                        warn!(
                            instance_id = %instance.instance_id,
                            "retention declaration is not a number; nothing pruned"
                        );
                    }
                }
                Ok(())
            })
            .await?;
        info!("finished prune phase");
        Ok(())
    }
}

/// Single entry point for the scheduled trigger.
///
/// The event payload is opaque: it is logged for operational visibility and
/// otherwise ignored. A fresh EC2-backed engine with the default
/// configuration executes exactly one run.
#[cfg(feature = "ec2")]
pub async fn handle_scheduled_event(event: &serde_json::Value) -> Result<()> {
    info!(payload = %event, "trigger event received");
    let provider = crate::provider::Ec2Provider::new().await?;
    let engine = RotationEngine::new(provider, RotationConfig::default())?;
    engine.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;
    use crate::provider::MemoryProvider;
    use chrono::TimeZone;

    const RUN_DATE: &str = "20240115";

    fn engine(provider: MemoryProvider) -> RotationEngine<MemoryProvider> {
        // Serial fan-out keeps phase ordering deterministic in tests.
        let config = RotationConfig::default().with_max_in_flight(1);
        RotationEngine::new(provider, config).unwrap()
    }

    async fn run(engine: &RotationEngine<MemoryProvider>) -> Result<()> {
        // 00:00 UTC on Jan 15 is 09:00 the same day at UTC+9.
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        engine.run_at(now).await
    }

    fn declared(id: &str, name: &str, volume: &str, generations: &str) -> Instance {
        Instance::new(id)
            .with_tag("Name", name)
            .with_tag("Snapshot-Generation", generations)
            .with_primary_volume(volume)
    }

    fn marked(id: &str, volume: &str, secs: i64) -> Snapshot {
        Snapshot::new(
            id,
            volume,
            chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        )
        .with_tag("Auto-Snapshot", "true")
    }

    #[tokio::test]
    async fn first_run_creates_and_keeps_within_target() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "2"));
        let engine = engine(provider);

        run(&engine).await.unwrap();

        let snapshots = engine.provider().snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].tag("Name"), Some("web01-20240115"));
        assert_eq!(snapshots[0].tag("Auto-Snapshot"), Some("true"));
    }

    #[tokio::test]
    async fn empty_population_is_a_no_op() {
        let engine = engine(MemoryProvider::new());
        run(&engine).await.unwrap();
        assert!(engine.provider().snapshots().is_empty());
    }

    #[tokio::test]
    async fn undeclared_instances_never_participate() {
        let provider = MemoryProvider::new();
        provider.add_instance(
            Instance::new("i-1")
                .with_tag("Name", "untracked")
                .with_primary_volume("vol-1"),
        );
        let engine = engine(provider);

        run(&engine).await.unwrap();
        assert!(engine.provider().snapshots().is_empty());
    }

    #[tokio::test]
    async fn empty_declaration_skips_both_phases() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", ""));
        provider.add_snapshot(marked("snap-old", "vol-1", 1_000));
        let engine = engine(provider);

        run(&engine).await.unwrap();

        // Nothing created, nothing deleted.
        assert_eq!(engine.provider().snapshot_ids(), vec!["snap-old"]);
    }

    #[tokio::test]
    async fn zero_declaration_purges_without_creating() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "0"));
        provider.add_snapshot(marked("snap-a", "vol-1", 1_000));
        provider.add_snapshot(marked("snap-b", "vol-1", 2_000));
        provider.add_snapshot(marked("snap-c", "vol-1", 3_000));
        let engine = engine(provider);

        run(&engine).await.unwrap();
        assert!(engine.provider().snapshots().is_empty());
    }

    #[tokio::test]
    async fn rotation_deletes_oldest_beyond_target() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "1"));
        // Seeded out of order; the run adds a fourth, newest snapshot.
        provider.add_snapshot(marked("snap-t3", "vol-1", 3_000));
        provider.add_snapshot(marked("snap-t1", "vol-1", 1_000));
        provider.add_snapshot(marked("snap-t2", "vol-1", 2_000));
        let engine = engine(provider);

        run(&engine).await.unwrap();

        let ids = engine.provider().snapshot_ids();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with("snap-0"), "expected the freshly minted snapshot, got {ids:?}");
    }

    #[tokio::test]
    async fn target_above_inventory_deletes_nothing() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "5"));
        provider.add_snapshot(marked("snap-a", "vol-1", 1_000));
        provider.add_snapshot(marked("snap-b", "vol-1", 2_000));
        let engine = engine(provider);

        run(&engine).await.unwrap();
        assert_eq!(engine.provider().snapshots().len(), 3);

        // A second run only adds another generation; still under target.
        run(&engine).await.unwrap();
        assert_eq!(engine.provider().snapshots().len(), 4);
    }

    #[tokio::test]
    async fn manual_snapshots_survive_a_purge() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "0"));
        provider.add_snapshot(marked("snap-managed", "vol-1", 1_000));
        provider.add_snapshot(Snapshot::new(
            "snap-manual",
            "vol-1",
            chrono::DateTime::from_timestamp(500, 0).unwrap(),
        ));
        let engine = engine(provider);

        run(&engine).await.unwrap();
        assert_eq!(engine.provider().snapshot_ids(), vec!["snap-manual"]);
    }

    #[tokio::test]
    async fn non_numeric_declaration_creates_but_never_prunes() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "two"));
        provider.add_snapshot(marked("snap-old", "vol-1", 1_000));
        let engine = engine(provider);

        run(&engine).await.unwrap();

        let snapshots = engine.provider().snapshots();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots
            .iter()
            .any(|snapshot| snapshot.snapshot_id == "snap-old"));
    }

    #[tokio::test]
    async fn create_failure_aborts_before_the_prune_phase() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "2"));
        provider.add_instance(declared("i-2", "db01", "vol-2", "0"));
        provider.add_snapshot(marked("snap-db", "vol-2", 1_000));
        provider.fail_creates_for("vol-1");
        let engine = engine(provider);

        let result = run(&engine).await;
        assert!(matches!(
            result,
            Err(RotateError::CreateFailed { instance_id, .. }) if instance_id == "i-1"
        ));

        // The prune phase never ran: i-2's purge target was not applied.
        assert_eq!(engine.provider().snapshot_ids(), vec!["snap-db"]);
    }

    #[tokio::test]
    async fn delete_failure_stops_remaining_instances() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "a", "vol-1", "0"));
        provider.add_instance(declared("i-2", "b", "vol-2", "0"));
        provider.add_instance(declared("i-3", "c", "vol-3", "0"));
        provider.add_snapshot(marked("snap-1", "vol-1", 1_000));
        provider.add_snapshot(marked("snap-2", "vol-2", 1_000));
        provider.add_snapshot(marked("snap-3", "vol-3", 1_000));
        provider.fail_delete_of("snap-2");
        let engine = engine(provider);

        let result = run(&engine).await;
        assert!(matches!(
            result,
            Err(RotateError::DeleteFailed { snapshot_id, .. }) if snapshot_id == "snap-2"
        ));

        // The first instance's deletion stands; the third was never reached.
        assert_eq!(engine.provider().snapshot_ids(), vec!["snap-2", "snap-3"]);
    }

    #[tokio::test]
    async fn snapshots_of_one_run_share_the_date_stamp() {
        let provider = MemoryProvider::new();
        provider.add_instance(declared("i-1", "web01", "vol-1", "2"));
        provider.add_instance(declared("i-2", "db01", "vol-2", "2"));
        let engine = engine(provider);

        run(&engine).await.unwrap();

        for snapshot in engine.provider().snapshots() {
            let name = snapshot.tag("Name").unwrap();
            assert!(name.ends_with(RUN_DATE), "unexpected name {name}");
        }
    }
}
