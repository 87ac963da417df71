//! Cached read paths used by the web layer.

use crate::connection::{ConnectionPool, ManageConnection};
use crate::core::{Result, sanitize_name};
use crate::storage::StoreConnection;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub const EXNATION_FLAG: &str = "http://www.nationstates.net/images/flags/exnation.png";
pub const DEFAULT_FLAG: &str = "http://www.nationstates.net/images/flags/default.jpg";

#[derive(Debug, Clone, Copy)]
struct CachedId {
    id: Option<i64>,
    fetched_at: Instant,
}

/// Name -> surrogate id cache. Misses are cached too, so unknown names
/// do not cost a connection on every request.
pub struct NationIdCache<M: ManageConnection> {
    pool: Arc<ConnectionPool<M>>,
    entries: Mutex<LruCache<String, CachedId>>,
    ttl: Duration,
}

impl<M> NationIdCache<M>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    pub fn new(pool: Arc<ConnectionPool<M>>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            pool,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Surrogate id for a nation name (any spelling), `None` if never stored.
    pub async fn get(&self, name: &str) -> Result<Option<i64>> {
        let key = sanitize_name(name);
        if let Some(id) = self.cached(&key)? {
            return Ok(id);
        }

        let id = self.pool.get_connection().await?.nation_id(&key).await?;
        debug!(%key, ?id, "nation id cache miss");
        self.entries.lock()?.put(
            key,
            CachedId {
                id,
                fetched_at: Instant::now(),
            },
        );
        Ok(id)
    }

    fn cached(&self, key: &str) -> Result<Option<Option<i64>>> {
        let mut entries = self.entries.lock()?;
        match entries.get(key).copied() {
            Some(entry) if entry.fetched_at.elapsed() <= self.ttl => Ok(Some(entry.id)),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Drop every cached entry, e.g. after a dump update.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }
}

/// Read-side lookups over the store.
pub struct LookupService<M: ManageConnection> {
    pool: Arc<ConnectionPool<M>>,
    ids: NationIdCache<M>,
}

impl<M> LookupService<M>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    pub fn new(pool: Arc<ConnectionPool<M>>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            ids: NationIdCache::new(Arc::clone(&pool), capacity, ttl),
            pool,
        }
    }

    pub fn ids(&self) -> &NationIdCache<M> {
        &self.ids
    }

    pub async fn nation_id(&self, name: &str) -> Result<Option<i64>> {
        self.ids.get(name).await
    }

    /// Flag URL for a nation: its own flag while alive, the ex-nation flag
    /// once dead, and the default flag for names never seen.
    pub async fn nation_flag(&self, name: &str) -> Result<String> {
        let key = sanitize_name(name);
        let nation = self.pool.get_connection().await?.nation(&key).await?;
        Ok(match nation {
            Some(nation) if nation.alive => nation.flag_url,
            Some(_) => EXNATION_FLAG.to_string(),
            None => DEFAULT_FLAG.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::PoolConfig;
    use crate::core::NationRecord;
    use crate::storage::{MemoryManager, MemoryStore};

    fn record(key: &str) -> NationRecord {
        NationRecord {
            key: key.to_string(),
            display_name: key.to_string(),
            wa_member: false,
            influence: String::new(),
            last_login: 0,
            flag_url: format!("http://example.com/{}.png", key),
            region: String::new(),
        }
    }

    async fn service(store: &MemoryStore, ttl: Duration) -> LookupService<MemoryManager> {
        let pool = ConnectionPool::new(PoolConfig::new(), MemoryManager::new(store.clone()))
            .await
            .unwrap();
        LookupService::new(Arc::new(pool), NonZeroUsize::new(16).unwrap(), ttl)
    }

    #[tokio::test]
    async fn test_flag_variants() {
        let store = MemoryStore::new();
        let mut conn = store.connect();
        conn.insert_nation(&record("alive_one")).await.unwrap();
        conn.insert_nation(&record("dead_one")).await.unwrap();
        conn.mark_nations_dead(&["dead_one".to_string()]).await.unwrap();

        let lookups = service(&store, Duration::from_secs(60)).await;
        assert_eq!(
            lookups.nation_flag("Alive One").await.unwrap(),
            "http://example.com/alive_one.png"
        );
        assert_eq!(lookups.nation_flag("dead_one").await.unwrap(), EXNATION_FLAG);
        assert_eq!(lookups.nation_flag("nobody").await.unwrap(), DEFAULT_FLAG);
    }

    #[tokio::test]
    async fn test_id_cache_serves_stale_until_ttl() {
        let store = MemoryStore::new();
        let lookups = service(&store, Duration::from_secs(60)).await;

        assert_eq!(lookups.nation_id("Testlandia").await.unwrap(), None);
        let id = store.connect().insert_nation(&record("testlandia")).await.unwrap();

        // Cached miss
        assert_eq!(lookups.nation_id("testlandia").await.unwrap(), None);

        lookups.ids().clear().unwrap();
        assert_eq!(lookups.nation_id("testlandia").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_expired_entries_refetch() {
        let store = MemoryStore::new();
        let lookups = service(&store, Duration::ZERO).await;

        assert_eq!(lookups.nation_id("testlandia").await.unwrap(), None);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let id = store.connect().insert_nation(&record("testlandia")).await.unwrap();
        assert_eq!(lookups.nation_id("testlandia").await.unwrap(), Some(id));
    }
}
