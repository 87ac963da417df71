use serde::{Deserialize, Serialize};
use std::fmt;

/// The two entity kinds carried by a world dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Nation,
    Region,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Nation => "nation",
            EntityKind::Region => "region",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One nation as it appears in the current dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NationRecord {
    pub key: String,
    pub display_name: String,
    pub wa_member: bool,
    pub influence: String,
    pub last_login: i64,
    pub flag_url: String,
    pub region: String,
}

/// One region as it appears in the current dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRecord {
    pub key: String,
    pub flag_url: String,
    pub delegate: String,
    pub population: i64,
}

/// A snapshot projection of a single dumped entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRecord {
    Nation(NationRecord),
    Region(RegionRecord),
}

impl SnapshotRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            SnapshotRecord::Nation(_) => EntityKind::Nation,
            SnapshotRecord::Region(_) => EntityKind::Region,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            SnapshotRecord::Nation(nation) => &nation.key,
            SnapshotRecord::Region(region) => &region.key,
        }
    }
}

/// Persistent nation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNation {
    pub id: i64,
    pub key: String,
    pub display_name: String,
    pub flag_url: String,
    pub region: String,
    pub influence: String,
    pub last_login: i64,
    pub wa_member: bool,
    pub alive: bool,
}

/// Persistent region row. Regions carry no liveness flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegion {
    pub key: String,
    pub flag_url: String,
    pub delegate: String,
}

/// Append-only population history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSample {
    pub region_key: String,
    pub population: i64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Outcome of one reconciliation pass for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub created: u64,
    pub removed: u64,
    /// Number of snapshot keys visited.
    pub processed: u64,
    /// Keys skipped under `FailurePolicy::Continue`.
    pub failed_keys: Vec<String>,
}

impl ReconcileResult {
    pub fn is_complete(&self) -> bool {
        self.failed_keys.is_empty()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} created, {} removed, {} failed",
            self.processed,
            self.created,
            self.removed,
            self.failed_keys.len()
        )
    }
}
