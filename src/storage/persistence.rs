// ============================================================================
// Store state file
// ============================================================================

use super::memory::Tables;
use crate::core::{Result, SyncError};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// MessagePack image of the whole store, replaced atomically on save.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn save(&self, tables: &Tables) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| SyncError::Io(format!("Failed to create state directory: {}", e)))?;

        let serialized = rmp_serde::to_vec(tables)
            .map_err(|e| SyncError::Io(format!("Failed to serialize state: {}", e)))?;

        let temp = NamedTempFile::new_in(&dir)
            .map_err(|e| SyncError::Io(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer
                .write_all(&serialized)
                .map_err(|e| SyncError::Io(format!("Failed to write state: {}", e)))?;
            writer
                .flush()
                .map_err(|e| SyncError::Io(format!("Failed to flush state: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| SyncError::Io(format!("Failed to sync state: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| SyncError::Io(format!("Failed to replace state file: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Tables>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)
            .map_err(|e| SyncError::Io(format!("Failed to open state: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| SyncError::Io(format!("Failed to read state: {}", e)))?;
        let tables = rmp_serde::from_slice(&data)
            .map_err(|e| SyncError::Io(format!("Failed to deserialize state: {}", e)))?;
        Ok(Some(tables))
    }
}
