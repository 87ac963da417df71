pub mod config;
pub mod pool;

use crate::core::Result;
use async_trait::async_trait;

pub use config::PoolConfig;
pub use pool::{ConnectionPool, PoolGuard, PoolStats};

/// Opens and checks connections on behalf of a `ConnectionPool`.
///
/// Similar to the manager traits of r2d2/bb8: the pool owns sizing and
/// eviction, the manager owns how a connection comes to exist.
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection. `id` is unique per pool.
    async fn connect(&self, id: u64) -> Result<Self::Connection>;

    /// Cheap liveness probe, run on checkout when enabled.
    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<()>;
}
