//! SQLite checkpoint backend
//!
//! One row per region; saves upsert on the region key.

use crate::record::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Checkpoint, CheckpointStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Opens or creates the checkpoint database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCheckpointStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let records = serde_json::to_string(&checkpoint.records)?;

        self.conn.execute(
            "INSERT INTO checkpoints (region, page_index, saved_at, config_hash, records)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(region) DO UPDATE SET
                page_index = excluded.page_index,
                saved_at = excluded.saved_at,
                config_hash = excluded.config_hash,
                records = excluded.records",
            params![
                checkpoint.region,
                checkpoint.page_index,
                checkpoint.saved_at.to_rfc3339(),
                checkpoint.config_hash,
                records,
            ],
        )?;

        info!(
            "Checkpoint saved for {}: page {}, {} records",
            checkpoint.region,
            checkpoint.page_index,
            checkpoint.records.len()
        );
        Ok(())
    }

    fn load(&self, region: &str) -> StorageResult<Option<Checkpoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT page_index, saved_at, config_hash, records
                 FROM checkpoints WHERE region = ?1",
                params![region],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((page_index, saved_at, config_hash, records)) = row else {
            return Ok(None);
        };

        let corrupt = |message: String| StorageError::Corrupt {
            region: region.to_string(),
            message,
        };

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| corrupt(format!("saved_at: {}", e)))?
            .with_timezone(&Utc);
        let records: Vec<Record> =
            serde_json::from_str(&records).map_err(|e| corrupt(format!("records: {}", e)))?;

        Ok(Some(Checkpoint {
            region: region.to_string(),
            page_index,
            records,
            saved_at,
            config_hash,
        }))
    }

    fn clear(&mut self, region: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM checkpoints WHERE region = ?1", params![region])?;
        info!("Checkpoint cleared for {}", region);
        Ok(())
    }
}
