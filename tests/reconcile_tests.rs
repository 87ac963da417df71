//! Integration tests for the reconciliation engine
//!
//! Drives full passes through the public API against the in-memory store.
//! Run with: cargo test --test reconcile_tests

use async_trait::async_trait;
use dumpsync::core::{PopulationSample, StoredNation};
use dumpsync::reconcile::Unthrottled;
use dumpsync::{
    ConnectionPool, DumpSnapshot, EntityKind, FailurePolicy, ManageConnection, MemoryManager,
    MemoryStore, NationRecord, ReconcileOptions, Reconciler, RegionRecord, Result, RetryPolicy,
    StoreConnection, SyncError,
};
use dumpsync::{PoolConfig, storage::MemoryConnection};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn nation(key: &str, influence: &str) -> NationRecord {
    NationRecord {
        key: key.to_string(),
        display_name: format!("The Republic of {}", key),
        wa_member: false,
        influence: influence.to_string(),
        last_login: 100,
        flag_url: format!("http://example.com/{}.png", key),
        region: "testregionia".to_string(),
    }
}

fn region(key: &str, population: i64) -> RegionRecord {
    RegionRecord {
        key: key.to_string(),
        flag_url: String::new(),
        delegate: "testlandia".to_string(),
        population,
    }
}

async fn engine(store: &MemoryStore) -> Reconciler<MemoryManager> {
    let pool = ConnectionPool::new(
        PoolConfig::new().max_connections(4),
        MemoryManager::new(store.clone()),
    )
    .await
    .unwrap();
    Reconciler::new(Arc::new(pool)).with_options(ReconcileOptions::default().throttle(Unthrottled))
}

#[tokio::test]
async fn test_stored_keys_match_snapshot_after_pass() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    let first = DumpSnapshot::new()
        .with_nation(nation("a", "Zero"))
        .with_nation(nation("b", "Zero"))
        .with_nation(nation("c", "Zero"));
    engine.reconcile(EntityKind::Nation, &first).await.unwrap();

    let second = DumpSnapshot::new()
        .with_nation(nation("b", "Zero"))
        .with_nation(nation("d", "Zero"));
    let result = engine.reconcile(EntityKind::Nation, &second).await.unwrap();

    assert_eq!(result.created, 1);
    assert_eq!(result.removed, 2);
    let expected: HashSet<String> = ["b", "d"].iter().map(|k| k.to_string()).collect();
    assert_eq!(store.alive_nation_keys().await, expected);
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;
    let snapshot = DumpSnapshot::new()
        .with_nation(nation("testlandia", "Zero"))
        .with_region(region("testregionia", 1))
        .with_region(region("otherregionia", 2));

    engine.reconcile(EntityKind::Nation, &snapshot).await.unwrap();
    engine.reconcile(EntityKind::Region, &snapshot).await.unwrap();
    let before: StoredNation = store.nation("testlandia").await.unwrap();
    let samples_before = store.population_sample_count().await;

    let nations = engine.reconcile(EntityKind::Nation, &snapshot).await.unwrap();
    let regions = engine.reconcile(EntityKind::Region, &snapshot).await.unwrap();

    assert_eq!((nations.created, nations.removed), (0, 0));
    assert_eq!((regions.created, regions.removed), (0, 0));
    assert_eq!(store.nation("testlandia").await.unwrap(), before);
    assert_eq!(store.population_sample_count().await, samples_before + 2);
}

#[tokio::test]
async fn test_population_history_is_monotonic() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    for population in [3, 5, 8] {
        let snapshot = DumpSnapshot::new().with_region(region("growing", population));
        engine.reconcile(EntityKind::Region, &snapshot).await.unwrap();
    }

    let samples: Vec<PopulationSample> = store.population_samples("growing").await;
    assert_eq!(samples.len(), 3);
    assert_eq!(
        samples.iter().map(|s| s.population).collect::<Vec<_>>(),
        vec![3, 5, 8]
    );
    assert!(
        samples
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp)
    );
}

#[tokio::test]
async fn test_absent_nation_is_soft_deleted_and_absent_region_is_removed() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    let first = DumpSnapshot::new()
        .with_nation(nation("leaving", "Zero"))
        .with_region(region("oldregionia", 4));
    engine.reconcile(EntityKind::Nation, &first).await.unwrap();
    engine.reconcile(EntityKind::Region, &first).await.unwrap();
    engine.reconcile(EntityKind::Region, &first).await.unwrap();
    assert_eq!(store.population_samples("oldregionia").await.len(), 2);

    let empty = DumpSnapshot::new()
        .with_empty(EntityKind::Nation)
        .with_empty(EntityKind::Region);
    let nations = engine.reconcile(EntityKind::Nation, &empty).await.unwrap();
    let regions = engine.reconcile(EntityKind::Region, &empty).await.unwrap();

    assert_eq!(nations.removed, 1);
    assert_eq!(regions.removed, 1);

    let leaving = store.nation("leaving").await.unwrap();
    assert!(!leaving.alive);
    assert!(store.region("oldregionia").await.is_none());
    assert!(store.population_samples("oldregionia").await.is_empty());
}

#[tokio::test]
async fn test_testlandia_update_scenario() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    let before = DumpSnapshot::new().with_nation(nation("testlandia", "Unproven"));
    engine.reconcile(EntityKind::Nation, &before).await.unwrap();
    let id = store.nation("testlandia").await.unwrap().id;

    let dump = r#"{"name":"Testlandia","fullname":"The Hive Mind of Testlandia","unstatus":"WA Member","influence":"Superpower","lastlogin":1700000000,"flag":"http://example.com/testlandia.svg","region":"testregionia"}"#;
    let after = DumpSnapshot::new().parse_nations(dump).unwrap();
    let result = engine.reconcile(EntityKind::Nation, &after).await.unwrap();

    assert_eq!(result.created, 0);
    let stored = store.nation("testlandia").await.unwrap();
    assert_eq!(stored.id, id);
    assert!(stored.wa_member);
    assert!(stored.alive);
    assert_eq!(stored.influence, "Superpower");
    assert_eq!(stored.display_name, "The Hive Mind of Testlandia");
    assert_eq!(stored.last_login, 1_700_000_000);
}

#[tokio::test]
async fn test_new_region_scenario() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    let dump = r#"{"name":"Newregionia","flag":"","delegate":"0","numnations":5}"#;
    let snapshot = DumpSnapshot::new().parse_regions(dump).unwrap();
    let result = engine.reconcile(EntityKind::Region, &snapshot).await.unwrap();

    assert_eq!(result.created, 1);
    assert!(store.region("newregionia").await.is_some());
    let samples = store.population_samples("newregionia").await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].population, 5);
    assert!(samples[0].timestamp > 0);
}

#[tokio::test]
async fn test_unloaded_dataset_fails_pass() {
    let store = MemoryStore::new();
    let engine = engine(&store).await;

    let regions_only = DumpSnapshot::new().with_region(region("r", 1));
    let err = engine
        .reconcile(EntityKind::Nation, &regions_only)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SourceUnavailable(_)));
}

#[tokio::test]
async fn test_cancelled_pass_stops_before_records() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let engine = engine(&store).await.with_cancellation(cancel.clone());
    cancel.cancel();

    let snapshot = DumpSnapshot::new().with_nation(nation("a", "Zero"));
    let err = engine
        .reconcile(EntityKind::Nation, &snapshot)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(store.nation_count().await, 0);
}

#[tokio::test]
async fn test_starved_pool_reports_exhaustion() {
    let store = MemoryStore::new();
    let pool = Arc::new(
        ConnectionPool::new(
            PoolConfig::new()
                .max_connections(1)
                .checkout_timeout(Duration::from_millis(50)),
            MemoryManager::new(store.clone()),
        )
        .await
        .unwrap(),
    );
    let engine = Reconciler::new(Arc::clone(&pool))
        .with_options(ReconcileOptions::default().throttle(Unthrottled));

    let held = pool.get_connection().await.unwrap();
    let snapshot = DumpSnapshot::new().with_nation(nation("a", "Zero"));
    let err = engine
        .reconcile(EntityKind::Nation, &snapshot)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PoolExhausted(_)));

    drop(held);
    let result = engine.reconcile(EntityKind::Nation, &snapshot).await.unwrap();
    assert_eq!(result.created, 1);
}

// ----------------------------------------------------------------------------
// Failure injection
// ----------------------------------------------------------------------------

/// Wraps the in-memory store and fails lookups of one nation or region key.
struct FlakyManager {
    inner: MemoryManager,
    key: String,
    /// Remaining transient failures; once zero, lookups succeed
    transient: Arc<AtomicU32>,
    permanent: bool,
}

struct FlakyConnection {
    inner: MemoryConnection,
    key: String,
    transient: Arc<AtomicU32>,
    permanent: bool,
}

#[async_trait]
impl ManageConnection for FlakyManager {
    type Connection = FlakyConnection;

    async fn connect(&self, id: u64) -> Result<FlakyConnection> {
        Ok(FlakyConnection {
            inner: self.inner.connect(id).await?,
            key: self.key.clone(),
            transient: Arc::clone(&self.transient),
            permanent: self.permanent,
        })
    }

    async fn is_valid(&self, conn: &mut FlakyConnection) -> Result<()> {
        conn.inner.ping().await
    }
}

impl FlakyConnection {
    fn check(&self, key: &str) -> Result<()> {
        if key != self.key {
            return Ok(());
        }
        if self.permanent {
            return Err(SyncError::Storage(format!("row for {} is corrupt", key)));
        }
        let remaining = self.transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::StorageBusy("lock wait timeout".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnection for FlakyConnection {
    async fn nation_id(&mut self, key: &str) -> Result<Option<i64>> {
        self.check(key)?;
        self.inner.nation_id(key).await
    }

    async fn nation(&mut self, key: &str) -> Result<Option<StoredNation>> {
        self.inner.nation(key).await
    }

    async fn insert_nation(&mut self, record: &NationRecord) -> Result<i64> {
        self.inner.insert_nation(record).await
    }

    async fn update_nation(&mut self, id: i64, record: &NationRecord) -> Result<()> {
        self.inner.update_nation(id, record).await
    }

    async fn alive_nation_keys(&mut self) -> Result<HashSet<String>> {
        self.inner.alive_nation_keys().await
    }

    async fn mark_nations_dead(&mut self, keys: &[String]) -> Result<u64> {
        self.inner.mark_nations_dead(keys).await
    }

    async fn region_exists(&mut self, key: &str) -> Result<bool> {
        self.check(key)?;
        self.inner.region_exists(key).await
    }

    async fn insert_region(&mut self, record: &RegionRecord) -> Result<()> {
        self.inner.insert_region(record).await
    }

    async fn update_region(&mut self, record: &RegionRecord) -> Result<()> {
        self.inner.update_region(record).await
    }

    async fn region_keys(&mut self) -> Result<HashSet<String>> {
        self.inner.region_keys().await
    }

    async fn delete_regions(&mut self, keys: &[String]) -> Result<u64> {
        self.inner.delete_regions(keys).await
    }

    async fn insert_population_sample(&mut self, sample: &PopulationSample) -> Result<()> {
        self.inner.insert_population_sample(sample).await
    }

    async fn delete_population_samples(&mut self, region_keys: &[String]) -> Result<u64> {
        self.inner.delete_population_samples(region_keys).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.inner.ping().await
    }
}

async fn flaky_engine(
    store: &MemoryStore,
    transient: u32,
    permanent: bool,
    options: ReconcileOptions,
) -> Reconciler<FlakyManager> {
    let manager = FlakyManager {
        inner: MemoryManager::new(store.clone()),
        key: "flaky".to_string(),
        transient: Arc::new(AtomicU32::new(transient)),
        permanent,
    };
    let pool = ConnectionPool::new(PoolConfig::new().max_connections(2), manager)
        .await
        .unwrap();
    Reconciler::new(Arc::new(pool)).with_options(options.throttle(Unthrottled))
}

fn flaky_snapshot() -> DumpSnapshot {
    DumpSnapshot::new()
        .with_nation(nation("flaky", "Zero"))
        .with_nation(nation("steady", "Zero"))
}

#[tokio::test]
async fn test_transient_failure_aborts_by_default() {
    let store = MemoryStore::new();
    let engine = flaky_engine(&store, 1, false, ReconcileOptions::default()).await;

    let err = engine
        .reconcile(EntityKind::Nation, &flaky_snapshot())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::StorageBusy(_)));
    assert!(store.nation("flaky").await.is_none());
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let store = MemoryStore::new();
    let options =
        ReconcileOptions::default().retry(RetryPolicy::attempts(3, Duration::from_millis(1)));
    let engine = flaky_engine(&store, 2, false, options).await;

    let result = engine
        .reconcile(EntityKind::Nation, &flaky_snapshot())
        .await
        .unwrap();
    assert_eq!(result.created, 2);
    assert!(result.is_complete());
    assert!(store.nation("flaky").await.unwrap().alive);
}

#[tokio::test]
async fn test_permanent_failure_is_skipped_when_continuing() {
    let store = MemoryStore::new();
    let options = ReconcileOptions::default()
        .retry(RetryPolicy::attempts(3, Duration::from_millis(1)))
        .on_record_failure(FailurePolicy::Continue);
    let engine = flaky_engine(&store, 0, true, options).await;

    let result = engine
        .reconcile(EntityKind::Nation, &flaky_snapshot())
        .await
        .unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.processed, 2);
    assert_eq!(result.failed_keys, vec!["flaky".to_string()]);
    assert!(!result.is_complete());
    assert!(store.nation("steady").await.is_some());
}

#[tokio::test]
async fn test_retried_region_is_sampled_once() {
    let store = MemoryStore::new();
    let options =
        ReconcileOptions::default().retry(RetryPolicy::attempts(3, Duration::from_millis(1)));
    let engine = flaky_engine(&store, 2, false, options).await;

    let snapshot = DumpSnapshot::new().with_region(region("flaky", 5));
    let result = engine
        .reconcile(EntityKind::Region, &snapshot)
        .await
        .unwrap();

    assert_eq!(result.created, 1);
    let samples = store.population_samples("flaky").await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].population, 5);
}
