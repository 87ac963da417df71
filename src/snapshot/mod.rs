pub mod dump;

use crate::core::{EntityKind, Result, SnapshotRecord};
use async_trait::async_trait;
use std::collections::HashSet;

pub use dump::DumpSnapshot;

/// Read side of a world dump.
///
/// `list_keys` returns a set: callers must not depend on iteration order.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// All normalized keys present in the dump for `kind`.
    async fn list_keys(&self, kind: EntityKind) -> Result<HashSet<String>>;

    /// Full record for one key. Fails with `RecordNotFound` if the key vanished.
    async fn get_record(&self, kind: EntityKind, key: &str) -> Result<SnapshotRecord>;
}
