use crate::core::{EntityKind, PopulationSample, Result, SnapshotRecord, SyncError};
use crate::storage::StoreConnection;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// Per-kind storage mutations driven by the reconciliation engine.
#[async_trait]
pub trait EntityStrategy: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Side record written once per record per pass, before the row upsert.
    /// Never repeated when the upsert is retried.
    async fn record_sample(
        &self,
        _conn: &mut dyn StoreConnection,
        _record: &SnapshotRecord,
        _sampled_at: i64,
    ) -> Result<()> {
        Ok(())
    }

    /// Insert-or-update one record. Returns `true` if a row was created.
    async fn upsert(
        &self,
        conn: &mut dyn StoreConnection,
        record: &SnapshotRecord,
    ) -> Result<bool>;

    /// Keys that the removal sweep diffs against the snapshot.
    async fn stored_keys(&self, conn: &mut dyn StoreConnection) -> Result<HashSet<String>>;

    /// Revoke every key in `dead_keys` in one batch. Returns rows affected.
    async fn remove(&self, conn: &mut dyn StoreConnection, dead_keys: &[String]) -> Result<u64>;
}

fn mismatch(expected: EntityKind, record: &SnapshotRecord) -> SyncError {
    SyncError::KindMismatch {
        key: record.key().to_string(),
        expected,
        found: record.kind(),
    }
}

/// Nations: upsert by surrogate id, soft-delete through the liveness flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct NationStrategy;

#[async_trait]
impl EntityStrategy for NationStrategy {
    fn kind(&self) -> EntityKind {
        EntityKind::Nation
    }

    async fn upsert(
        &self,
        conn: &mut dyn StoreConnection,
        record: &SnapshotRecord,
    ) -> Result<bool> {
        let SnapshotRecord::Nation(nation) = record else {
            return Err(mismatch(EntityKind::Nation, record));
        };

        match conn.nation_id(&nation.key).await? {
            None => {
                let id = conn.insert_nation(nation).await?;
                debug!(key = %nation.key, id, "added nation");
                Ok(true)
            }
            Some(id) => {
                conn.update_nation(id, nation).await?;
                debug!(key = %nation.key, id, "updated nation");
                Ok(false)
            }
        }
    }

    async fn stored_keys(&self, conn: &mut dyn StoreConnection) -> Result<HashSet<String>> {
        conn.alive_nation_keys().await
    }

    async fn remove(&self, conn: &mut dyn StoreConnection, dead_keys: &[String]) -> Result<u64> {
        conn.mark_nations_dead(dead_keys).await
    }
}

/// Regions: always sample population, upsert by key, hard-delete when gone.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionStrategy;

#[async_trait]
impl EntityStrategy for RegionStrategy {
    fn kind(&self) -> EntityKind {
        EntityKind::Region
    }

    async fn record_sample(
        &self,
        conn: &mut dyn StoreConnection,
        record: &SnapshotRecord,
        sampled_at: i64,
    ) -> Result<()> {
        let SnapshotRecord::Region(region) = record else {
            return Err(mismatch(EntityKind::Region, record));
        };

        conn.insert_population_sample(&PopulationSample {
            region_key: region.key.clone(),
            population: region.population,
            timestamp: sampled_at,
        })
        .await
    }

    async fn upsert(
        &self,
        conn: &mut dyn StoreConnection,
        record: &SnapshotRecord,
    ) -> Result<bool> {
        let SnapshotRecord::Region(region) = record else {
            return Err(mismatch(EntityKind::Region, record));
        };

        if conn.region_exists(&region.key).await? {
            conn.update_region(region).await?;
            debug!(key = %region.key, population = region.population, "updated region");
            Ok(false)
        } else {
            conn.insert_region(region).await?;
            debug!(key = %region.key, population = region.population, "added region");
            Ok(true)
        }
    }

    async fn stored_keys(&self, conn: &mut dyn StoreConnection) -> Result<HashSet<String>> {
        conn.region_keys().await
    }

    async fn remove(&self, conn: &mut dyn StoreConnection, dead_keys: &[String]) -> Result<u64> {
        let removed = conn.delete_regions(dead_keys).await?;
        let samples = conn.delete_population_samples(dead_keys).await?;
        debug!(removed, samples, "purged dead regions");
        Ok(removed)
    }
}
