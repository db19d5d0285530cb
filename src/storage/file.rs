//! JSON file checkpoint backend
//!
//! One `checkpoint_<REGION>.json` per region. Saves go to a temporary file in
//! the same directory which is then renamed over the previous checkpoint.

use crate::storage::traits::{Checkpoint, CheckpointStore, StorageError, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Checkpoints as JSON files in a directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates the store, creating the directory if needed
    pub fn new(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of the region's checkpoint file
    pub fn path_for(&self, region: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", region))
    }

    fn temp_path_for(&self, region: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json.tmp", region))
    }

    /// Older per-save files (`checkpoint_<REGION>_<suffix>.json|.tmp`)
    fn legacy_files(&self, region: &str) -> StorageResult<Vec<PathBuf>> {
        let prefix = format!("checkpoint_{}_", region);
        let mut found = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) && (name.ends_with(".json") || name.ends_with(".tmp")) {
                found.push(path);
            }
        }

        Ok(found)
    }
}

fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let path = self.path_for(&checkpoint.region);
        let temp = self.temp_path_for(&checkpoint.region);

        let json = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;

        info!(
            "Checkpoint saved for {}: page {}, {} records",
            checkpoint.region,
            checkpoint.page_index,
            checkpoint.records.len()
        );
        Ok(())
    }

    fn load(&self, region: &str) -> StorageResult<Option<Checkpoint>> {
        let path = self.path_for(region);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                region: region.to_string(),
                message: e.to_string(),
            })?;

        if checkpoint.region != region {
            return Err(StorageError::Corrupt {
                region: region.to_string(),
                message: format!("file holds region {}", checkpoint.region),
            });
        }

        Ok(Some(checkpoint))
    }

    fn clear(&mut self, region: &str) -> StorageResult<()> {
        remove_if_exists(&self.path_for(region))?;
        remove_if_exists(&self.temp_path_for(region))?;

        for legacy in self.legacy_files(region)? {
            debug!("Removing legacy checkpoint {}", legacy.display());
            remove_if_exists(&legacy)?;
        }

        info!("Checkpoint cleared for {}", region);
        Ok(())
    }
}
