use super::{ManageConnection, config::PoolConfig};
use crate::core::{Result, SyncError};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Connection pool
///
/// Hands out short-lived connections bounded by `max_connections`.
/// Every checkout holds a semaphore permit, so waiting callers queue fairly
/// and give up with `PoolExhausted` after `checkout_timeout`.
pub struct ConnectionPool<M: ManageConnection> {
    /// Pool configuration
    config: PoolConfig,
    manager: M,
    shared: Arc<Shared<M::Connection>>,
    /// One permit per connection slot
    permits: Arc<Semaphore>,
    /// Next connection ID
    next_id: AtomicU64,
}

/// State shared between the pool and its outstanding guards
struct Shared<C> {
    /// Idle connections
    available: Mutex<VecDeque<PooledConnection<C>>>,
    /// Idle plus checked-out connections
    total_connections: AtomicUsize,
}

/// A connection from the pool
struct PooledConnection<C> {
    connection: C,
    created_at: Instant,
    last_used: Instant,
}

impl<C> PooledConnection<C> {
    fn new(connection: C) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, config: &PoolConfig) -> bool {
        match config.max_lifetime {
            Some(lifetime) => self.created_at.elapsed() > lifetime,
            None => false,
        }
    }

    fn is_idle_too_long(&self, config: &PoolConfig) -> bool {
        match config.idle_timeout {
            Some(timeout) => self.last_used.elapsed() > timeout,
            None => false,
        }
    }

    fn refresh_last_used(&mut self) {
        self.last_used = Instant::now();
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create a pool and pre-open `min_connections`.
    pub async fn new(config: PoolConfig, manager: M) -> Result<Self> {
        config.validate().map_err(SyncError::Config)?;

        let pool = Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            manager,
            shared: Arc::new(Shared {
                available: Mutex::new(VecDeque::new()),
                total_connections: AtomicUsize::new(0),
            }),
            next_id: AtomicU64::new(1),
        };

        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard<M::Connection>> {
        let permit = tokio::time::timeout(
            self.config.checkout_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            SyncError::PoolExhausted(format!(
                "no connection available within {:?}",
                self.config.checkout_timeout
            ))
        })?
        .map_err(|_| SyncError::PoolExhausted("connection pool closed".into()))?;

        loop {
            let Some(mut pooled) = self.take_available()? else {
                let connection = self.open_connection().await?;
                return Ok(self.guard(PooledConnection::new(connection), permit));
            };

            if self.config.test_on_checkout {
                if let Err(err) = self.manager.is_valid(&mut pooled.connection).await {
                    debug!(error = %err, "discarding connection that failed checkout test");
                    self.shared.total_connections.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
            }

            pooled.refresh_last_used();
            return Ok(self.guard(pooled, permit));
        }
    }

    fn guard(
        &self,
        pooled: PooledConnection<M::Connection>,
        permit: OwnedSemaphorePermit,
    ) -> PoolGuard<M::Connection> {
        PoolGuard {
            connection: Some(pooled),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        }
    }

    /// Pop an idle connection, evicting expired ones on the way
    fn take_available(&self) -> Result<Option<PooledConnection<M::Connection>>> {
        let mut available = self.shared.available.lock()?;

        let before = available.len();
        available.retain(|pooled| {
            !pooled.is_expired(&self.config) && !pooled.is_idle_too_long(&self.config)
        });
        let removed = before - available.len();

        if removed > 0 {
            debug!(removed, "evicted stale pooled connections");
            self.shared
                .total_connections
                .fetch_sub(removed, Ordering::SeqCst);
        }

        Ok(available.pop_front())
    }

    async fn open_connection(&self) -> Result<M::Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = self.manager.connect(id).await?;
        self.shared.total_connections.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) -> Result<()> {
        while self.shared.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.open_connection().await?;
            self.shared
                .available
                .lock()?
                .push_back(PooledConnection::new(connection));
        }

        Ok(())
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let available = self
            .shared
            .available
            .lock()
            .map(|available| available.len())
            .unwrap_or(0);
        let total = self.shared.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available,
            active_connections: total.saturating_sub(available),
            max_connections: self.config.max_connections,
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped, on every exit path.
pub struct PoolGuard<C> {
    connection: Option<PooledConnection<C>>,
    shared: Arc<Shared<C>>,
    // Released after the connection is back in the idle queue.
    _permit: OwnedSemaphorePermit,
}

impl<C> PoolGuard<C> {
    /// Get a reference to the connection
    pub fn connection(&mut self) -> &mut C {
        match self.connection.as_mut() {
            Some(pooled) => &mut pooled.connection,
            None => unreachable!("connection is only taken in Drop"),
        }
    }
}

impl<C> Deref for PoolGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        match self.connection.as_ref() {
            Some(pooled) => &pooled.connection,
            None => unreachable!("connection is only taken in Drop"),
        }
    }
}

impl<C> DerefMut for PoolGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.connection()
    }
}

impl<C> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        let Some(mut pooled) = self.connection.take() else {
            return;
        };
        pooled.refresh_last_used();

        match self.shared.available.lock() {
            Ok(mut available) => available.push_back(pooled),
            Err(_) => {
                warn!("pool lock poisoned, dropping returned connection");
                self.shared.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}
