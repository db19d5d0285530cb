//! Checkpoint store trait and error types

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt checkpoint for {region}: {message}")]
    Corrupt { region: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable resumption snapshot of a region session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub region: String,

    /// Last completed page (0 = none)
    pub page_index: u32,

    pub records: Vec<Record>,
    pub saved_at: DateTime<Utc>,

    /// Hash of the configuration the session ran with
    #[serde(default)]
    pub config_hash: Option<String>,
}

impl Checkpoint {
    /// Snapshot taken now
    pub fn new(region: &str, page_index: u32, records: Vec<Record>) -> Self {
        Self {
            region: region.to_string(),
            page_index,
            records,
            saved_at: Utc::now(),
            config_hash: None,
        }
    }

    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        self.config_hash = hash;
        self
    }

    /// First page a resumed session must extract
    pub fn next_page(&self) -> u32 {
        self.page_index + 1
    }
}

/// Trait for checkpoint backends
///
/// At most one checkpoint exists per region; `save` supersedes the previous
/// one as a single step.
pub trait CheckpointStore: Send {
    /// Stores the checkpoint, replacing any previous one for its region
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Loads the region's checkpoint, if any
    fn load(&self, region: &str) -> StorageResult<Option<Checkpoint>>;

    /// Removes the region's checkpoint; a missing checkpoint is not an error
    fn clear(&mut self, region: &str) -> StorageResult<()>;
}

/// Records and first page to extract for a region
///
/// Returns the stored records and `last completed + 1`, or `(empty, 1)`
/// when no checkpoint exists.
pub fn resume_point(
    store: &dyn CheckpointStore,
    region: &str,
) -> StorageResult<(Vec<Record>, u32)> {
    Ok(match store.load(region)? {
        Some(checkpoint) => {
            let next = checkpoint.next_page();
            (checkpoint.records, next)
        }
        None => (Vec::new(), 1),
    })
}
