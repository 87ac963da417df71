use super::SnapshotSource;
use crate::core::{
    EntityKind, NationRecord, RegionRecord, Result, SnapshotRecord, SyncError, sanitize_name,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Nation line in the newline-delimited dump.
#[derive(Debug, Deserialize)]
struct RawNation {
    name: String,
    #[serde(default)]
    fullname: String,
    #[serde(default)]
    unstatus: String,
    #[serde(default)]
    influence: String,
    #[serde(default)]
    lastlogin: i64,
    #[serde(default)]
    flag: String,
    #[serde(default)]
    region: String,
}

impl From<RawNation> for NationRecord {
    fn from(raw: RawNation) -> Self {
        NationRecord {
            key: sanitize_name(&raw.name),
            display_name: raw.fullname,
            wa_member: is_wa_member(&raw.unstatus),
            influence: raw.influence,
            last_login: raw.lastlogin,
            flag_url: raw.flag,
            region: raw.region,
        }
    }
}

/// Region line in the newline-delimited dump.
#[derive(Debug, Deserialize)]
struct RawRegion {
    name: String,
    #[serde(default)]
    flag: String,
    #[serde(default)]
    delegate: String,
    #[serde(default)]
    numnations: i64,
}

impl From<RawRegion> for RegionRecord {
    fn from(raw: RawRegion) -> Self {
        RegionRecord {
            key: sanitize_name(&raw.name),
            flag_url: raw.flag,
            delegate: raw.delegate,
            population: raw.numnations,
        }
    }
}

/// Anything other than "non-member" (any case) counts as World Assembly membership.
pub fn is_wa_member(unstatus: &str) -> bool {
    !unstatus.trim().eq_ignore_ascii_case("non-member")
}

/// A parsed world dump held in memory for one pass.
///
/// A kind whose dataset was never loaded reports `SourceUnavailable`.
#[derive(Debug, Default, Clone)]
pub struct DumpSnapshot {
    nations: Option<HashMap<String, NationRecord>>,
    regions: Option<HashMap<String, RegionRecord>>,
}

impl DumpSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a nation, marking the nation dataset as loaded.
    pub fn with_nation(mut self, record: NationRecord) -> Self {
        self.nations
            .get_or_insert_with(HashMap::new)
            .insert(record.key.clone(), record);
        self
    }

    /// Add a region, marking the region dataset as loaded.
    pub fn with_region(mut self, record: RegionRecord) -> Self {
        self.regions
            .get_or_insert_with(HashMap::new)
            .insert(record.key.clone(), record);
        self
    }

    /// Mark a dataset as loaded even if it holds no records.
    pub fn with_empty(mut self, kind: EntityKind) -> Self {
        match kind {
            EntityKind::Nation => {
                self.nations.get_or_insert_with(HashMap::new);
            }
            EntityKind::Region => {
                self.regions.get_or_insert_with(HashMap::new);
            }
        }
        self
    }

    pub fn parse_nations(mut self, text: &str) -> Result<Self> {
        let nations = self.nations.get_or_insert_with(HashMap::new);
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawNation = serde_json::from_str(line).map_err(|e| {
                SyncError::SourceUnavailable(format!("nation dump line {}: {}", line_no + 1, e))
            })?;
            let record = NationRecord::from(raw);
            nations.insert(record.key.clone(), record);
        }
        Ok(self)
    }

    pub fn parse_regions(mut self, text: &str) -> Result<Self> {
        let regions = self.regions.get_or_insert_with(HashMap::new);
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawRegion = serde_json::from_str(line).map_err(|e| {
                SyncError::SourceUnavailable(format!("region dump line {}: {}", line_no + 1, e))
            })?;
            let record = RegionRecord::from(raw);
            regions.insert(record.key.clone(), record);
        }
        Ok(self)
    }

    pub async fn load_nations<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let text = read_dump(path.as_ref()).await?;
        self.parse_nations(&text)
    }

    pub async fn load_regions<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let text = read_dump(path.as_ref()).await?;
        self.parse_regions(&text)
    }

    fn unavailable(kind: EntityKind) -> SyncError {
        SyncError::SourceUnavailable(format!("{} dump not loaded", kind))
    }
}

async fn read_dump(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        SyncError::SourceUnavailable(format!("failed to read {}: {}", path.display(), e))
    })
}

#[async_trait]
impl SnapshotSource for DumpSnapshot {
    async fn list_keys(&self, kind: EntityKind) -> Result<HashSet<String>> {
        match kind {
            EntityKind::Nation => self
                .nations
                .as_ref()
                .map(|nations| nations.keys().cloned().collect())
                .ok_or_else(|| Self::unavailable(kind)),
            EntityKind::Region => self
                .regions
                .as_ref()
                .map(|regions| regions.keys().cloned().collect())
                .ok_or_else(|| Self::unavailable(kind)),
        }
    }

    async fn get_record(&self, kind: EntityKind, key: &str) -> Result<SnapshotRecord> {
        let not_found = || SyncError::RecordNotFound {
            kind,
            key: key.to_string(),
        };
        match kind {
            EntityKind::Nation => {
                let nations = self.nations.as_ref().ok_or_else(|| Self::unavailable(kind))?;
                nations
                    .get(key)
                    .cloned()
                    .map(SnapshotRecord::Nation)
                    .ok_or_else(not_found)
            }
            EntityKind::Region => {
                let regions = self.regions.as_ref().ok_or_else(|| Self::unavailable(kind))?;
                regions
                    .get(key)
                    .cloned()
                    .map(SnapshotRecord::Region)
                    .ok_or_else(not_found)
            }
        }
    }
}
