use crate::core::{NationRecord, PopulationSample, RegionRecord, Result, StoredNation};
use async_trait::async_trait;
use std::collections::HashSet;

/// One checked-out storage connection.
///
/// The reconciliation engine only ever talks to storage through this trait,
/// so any pooled backend can be plugged in behind a `ManageConnection`.
/// Batched methods must apply all keys in a single round trip.
#[async_trait]
pub trait StoreConnection: Send {
    /// Surrogate id of the nation stored under `key`, alive or not.
    async fn nation_id(&mut self, key: &str) -> Result<Option<i64>>;

    async fn nation(&mut self, key: &str) -> Result<Option<StoredNation>>;

    /// Insert a new, alive nation. Fails if the key is already stored.
    async fn insert_nation(&mut self, record: &NationRecord) -> Result<i64>;

    /// Overwrite the descriptive fields of nation `id` and mark it alive.
    ///
    /// Re-affirming liveness keeps "alive stored keys == dump keys" true after
    /// a pass for a nation that left one dump and came back in a later one.
    async fn update_nation(&mut self, id: i64, record: &NationRecord) -> Result<()>;

    async fn alive_nation_keys(&mut self) -> Result<HashSet<String>>;

    /// Batched `alive = false`. Returns the number of rows changed.
    async fn mark_nations_dead(&mut self, keys: &[String]) -> Result<u64>;

    async fn region_exists(&mut self, key: &str) -> Result<bool>;

    /// Insert a new region. Fails if the key is already stored.
    async fn insert_region(&mut self, record: &RegionRecord) -> Result<()>;

    async fn update_region(&mut self, record: &RegionRecord) -> Result<()>;

    async fn region_keys(&mut self) -> Result<HashSet<String>>;

    /// Batched hard delete of region rows. Returns the number of rows removed.
    async fn delete_regions(&mut self, keys: &[String]) -> Result<u64>;

    async fn insert_population_sample(&mut self, sample: &PopulationSample) -> Result<()>;

    /// Batched delete of every population sample of the given regions.
    async fn delete_population_samples(&mut self, region_keys: &[String]) -> Result<u64>;

    /// Cheap liveness probe used by pool checkout tests.
    async fn ping(&mut self) -> Result<()>;
}
