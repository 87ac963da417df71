// ============================================================================
// dumpsync Library
// ============================================================================

pub mod auth;
pub mod config;
pub mod connection;
pub mod core;
pub mod lookup;
pub mod reconcile;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use core::{
    EntityKind, NationRecord, ReconcileResult, RegionRecord, Result, SnapshotRecord, SyncError,
};

pub use connection::{ConnectionPool, ManageConnection, PoolConfig, PoolGuard, PoolStats};
pub use reconcile::{
    FailurePolicy, ReconcileOptions, Reconciler, RetryPolicy, SampleClock, Throttle,
};
pub use snapshot::{DumpSnapshot, SnapshotSource};
pub use storage::{MemoryManager, MemoryStore, StoreConnection};

pub use auth::{AuthRejection, AuthService, TokenStore};
pub use lookup::LookupService;
pub use scheduler::{DumpUpdateTask, UpdateReport};
