pub mod error;
pub mod names;
pub mod types;

pub use error::{Result, SyncError};
pub use names::{format_name, is_valid_key, sanitize_name};
pub use types::{
    EntityKind, NationRecord, PopulationSample, ReconcileResult, RegionRecord, SnapshotRecord,
    StoredNation, StoredRegion,
};
