use super::StoreConnection;
use super::persistence::StateFile;
use crate::connection::ManageConnection;
use crate::core::{
    NationRecord, PopulationSample, RegionRecord, Result, StoredNation, StoredRegion, SyncError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The three tables of the application store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tables {
    nations: HashMap<String, StoredNation>,
    /// Secondary index: surrogate id -> key
    nation_ids: HashMap<i64, String>,
    next_nation_id: i64,
    regions: HashMap<String, StoredRegion>,
    populations: Vec<PopulationSample>,
}

impl Tables {
    fn allocate_nation_id(&mut self) -> i64 {
        self.next_nation_id += 1;
        self.next_nation_id
    }
}

/// In-memory application store shared by every connection handed out.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store from a state file, or an empty one if the file is absent.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let tables = StateFile::new(path).load()?.unwrap_or_default();
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    /// Write the full store state atomically.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let tables = self.tables.read().await.clone();
        let file = StateFile::new(path);
        tokio::task::spawn_blocking(move || file.save(&tables))
            .await
            .map_err(|e| SyncError::Io(format!("state writer panicked: {}", e)))?
    }

    pub async fn nation(&self, key: &str) -> Option<StoredNation> {
        self.tables.read().await.nations.get(key).cloned()
    }

    pub async fn region(&self, key: &str) -> Option<StoredRegion> {
        self.tables.read().await.regions.get(key).cloned()
    }

    pub async fn nation_count(&self) -> usize {
        self.tables.read().await.nations.len()
    }

    pub async fn region_count(&self) -> usize {
        self.tables.read().await.regions.len()
    }

    /// Population history of one region, oldest first.
    pub async fn population_samples(&self, region_key: &str) -> Vec<PopulationSample> {
        self.tables
            .read()
            .await
            .populations
            .iter()
            .filter(|sample| sample.region_key == region_key)
            .cloned()
            .collect()
    }

    pub async fn population_sample_count(&self) -> usize {
        self.tables.read().await.populations.len()
    }

    pub async fn alive_nation_keys(&self) -> HashSet<String> {
        alive_keys(&*self.tables.read().await)
    }

    pub async fn region_keys(&self) -> HashSet<String> {
        self.tables.read().await.regions.keys().cloned().collect()
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            tables: Arc::clone(&self.tables),
        }
    }
}

fn alive_keys(tables: &Tables) -> HashSet<String> {
    tables
        .nations
        .values()
        .filter(|nation| nation.alive)
        .map(|nation| nation.key.clone())
        .collect()
}

/// A connection to a `MemoryStore`.
pub struct MemoryConnection {
    tables: Arc<RwLock<Tables>>,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn nation_id(&mut self, key: &str) -> Result<Option<i64>> {
        Ok(self.tables.read().await.nations.get(key).map(|n| n.id))
    }

    async fn nation(&mut self, key: &str) -> Result<Option<StoredNation>> {
        Ok(self.tables.read().await.nations.get(key).cloned())
    }

    async fn insert_nation(&mut self, record: &NationRecord) -> Result<i64> {
        let mut tables = self.tables.write().await;
        if tables.nations.contains_key(&record.key) {
            return Err(SyncError::Storage(format!(
                "duplicate nation key '{}'",
                record.key
            )));
        }

        let id = tables.allocate_nation_id();
        tables.nation_ids.insert(id, record.key.clone());
        tables.nations.insert(
            record.key.clone(),
            StoredNation {
                id,
                key: record.key.clone(),
                display_name: record.display_name.clone(),
                flag_url: record.flag_url.clone(),
                region: record.region.clone(),
                influence: record.influence.clone(),
                last_login: record.last_login,
                wa_member: record.wa_member,
                alive: true,
            },
        );
        Ok(id)
    }

    async fn update_nation(&mut self, id: i64, record: &NationRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        let key = tables
            .nation_ids
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::Storage(format!("no nation with id {}", id)))?;
        let nation = tables
            .nations
            .get_mut(&key)
            .ok_or_else(|| SyncError::Storage(format!("nation index out of sync for id {}", id)))?;

        nation.display_name = record.display_name.clone();
        nation.flag_url = record.flag_url.clone();
        nation.region = record.region.clone();
        nation.influence = record.influence.clone();
        nation.last_login = record.last_login;
        nation.wa_member = record.wa_member;
        nation.alive = true;
        Ok(())
    }

    async fn alive_nation_keys(&mut self) -> Result<HashSet<String>> {
        Ok(alive_keys(&*self.tables.read().await))
    }

    async fn mark_nations_dead(&mut self, keys: &[String]) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for key in keys {
            if let Some(nation) = tables.nations.get_mut(key) {
                if nation.alive {
                    nation.alive = false;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn region_exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.tables.read().await.regions.contains_key(key))
    }

    async fn insert_region(&mut self, record: &RegionRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.regions.contains_key(&record.key) {
            return Err(SyncError::Storage(format!(
                "duplicate region key '{}'",
                record.key
            )));
        }
        tables.regions.insert(
            record.key.clone(),
            StoredRegion {
                key: record.key.clone(),
                flag_url: record.flag_url.clone(),
                delegate: record.delegate.clone(),
            },
        );
        Ok(())
    }

    async fn update_region(&mut self, record: &RegionRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        let region = tables
            .regions
            .get_mut(&record.key)
            .ok_or_else(|| SyncError::Storage(format!("no region '{}'", record.key)))?;
        region.flag_url = record.flag_url.clone();
        region.delegate = record.delegate.clone();
        Ok(())
    }

    async fn region_keys(&mut self) -> Result<HashSet<String>> {
        Ok(self.tables.read().await.regions.keys().cloned().collect())
    }

    async fn delete_regions(&mut self, keys: &[String]) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let removed = keys
            .iter()
            .filter(|key| tables.regions.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn insert_population_sample(&mut self, sample: &PopulationSample) -> Result<()> {
        self.tables.write().await.populations.push(sample.clone());
        Ok(())
    }

    async fn delete_population_samples(&mut self, region_keys: &[String]) -> Result<u64> {
        let doomed: HashSet<&str> = region_keys.iter().map(String::as_str).collect();
        let mut tables = self.tables.write().await;
        let before = tables.populations.len();
        tables
            .populations
            .retain(|sample| !doomed.contains(sample.region_key.as_str()));
        Ok((before - tables.populations.len()) as u64)
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Hands out `MemoryConnection`s to a `ConnectionPool`.
#[derive(Clone)]
pub struct MemoryManager {
    store: MemoryStore,
}

impl MemoryManager {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl ManageConnection for MemoryManager {
    type Connection = MemoryConnection;

    async fn connect(&self, _id: u64) -> Result<MemoryConnection> {
        Ok(self.store.connect())
    }

    async fn is_valid(&self, conn: &mut MemoryConnection) -> Result<()> {
        conn.ping().await
    }
}
