//! Checkpoint persistence
//!
//! A checkpoint holds everything needed to resume a region session: the
//! records gathered so far and the last completed page. Two backends:
//! - JSON files, one per region (default)
//! - a SQLite database with one row per region

mod file;
mod schema;
mod sqlite;
mod traits;

pub use file::FileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{resume_point, Checkpoint, CheckpointStore, StorageError, StorageResult};

use crate::config::{CheckpointBackend, OutputConfig};
use std::path::Path;

/// File name of the SQLite checkpoint database inside the checkpoint directory
pub const SQLITE_FILE_NAME: &str = "checkpoints.db";

/// Opens the checkpoint backend selected in the output settings
///
/// # Arguments
///
/// * `output` - Output settings naming the backend and directory
///
/// # Returns
///
/// * `Ok(Box<dyn CheckpointStore>)` - The opened store
/// * `Err(StorageError)` - The directory or database could not be opened
pub fn open_store(output: &OutputConfig) -> StorageResult<Box<dyn CheckpointStore>> {
    let dir = Path::new(&output.checkpoint_dir);

    Ok(match output.checkpoint_backend {
        CheckpointBackend::File => Box::new(FileCheckpointStore::new(dir)?),
        CheckpointBackend::Sqlite => {
            std::fs::create_dir_all(dir)?;
            Box::new(SqliteCheckpointStore::new(&dir.join(SQLITE_FILE_NAME))?)
        }
    })
}
