use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::faststart_core::item::FileItem;
use crate::sync_ext::MutexExt;

pub const CACHE_FILENAME: &str = "_migrated.sqlite";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache record for item {0}")]
    MissingRecord(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable per-item migration decisions, keyed by item id. Every call is a
/// single committed statement; concurrent jobs each touch only their own key.
pub struct MigrationCache {
    conn: Mutex<Connection>,
}

impl MigrationCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS migrated (
                id TEXT PRIMARY KEY,
                is_faststart INTEGER NOT NULL,
                is_native_codec INTEGER NOT NULL,
                migrated INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn is_migrated(&self, item: &FileItem) -> Result<bool, CacheError> {
        let conn = self.conn.lock_unpoisoned();
        let migrated: Option<bool> = conn
            .query_row(
                "SELECT migrated FROM migrated WHERE id = ?1",
                params![item.id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(migrated.unwrap_or(false))
    }

    pub fn has_cache(&self, item: &FileItem) -> Result<bool, CacheError> {
        let conn = self.conn.lock_unpoisoned();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM migrated WHERE id = ?1",
                params![item.id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether the last probe concluded the item needs a full transcode.
    /// Only meaningful when a record exists.
    pub fn need_transcode(&self, item: &FileItem) -> Result<bool, CacheError> {
        let conn = self.conn.lock_unpoisoned();
        let is_native: Option<bool> = conn
            .query_row(
                "SELECT is_native_codec FROM migrated WHERE id = ?1",
                params![item.id],
                |row| row.get(0),
            )
            .optional()?;
        match is_native {
            Some(native) => Ok(!native),
            None => Err(CacheError::MissingRecord(item.id.clone())),
        }
    }

    /// Upsert the probed flags. Never touches the `migrated` column.
    pub fn set_cache(
        &self,
        item: &FileItem,
        is_faststart: bool,
        is_native_codec: bool,
    ) -> Result<(), CacheError> {
        let conn = self.conn.lock_unpoisoned();
        conn.execute(
            "INSERT INTO migrated (id, is_faststart, is_native_codec, migrated)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(id) DO UPDATE SET
                 is_faststart = excluded.is_faststart,
                 is_native_codec = excluded.is_native_codec",
            params![item.id, is_faststart, is_native_codec],
        )?;
        Ok(())
    }

    /// Mark the item terminally done. Creates the record with both flags true
    /// when absent, so `migrated` always implies faststart and native codec.
    pub fn set_migrated(&self, item: &FileItem) -> Result<(), CacheError> {
        let conn = self.conn.lock_unpoisoned();
        conn.execute(
            "INSERT INTO migrated (id, is_faststart, is_native_codec, migrated)
             VALUES (?1, 1, 1, 1)
             ON CONFLICT(id) DO UPDATE SET migrated = 1",
            params![item.id],
        )?;
        Ok(())
    }

    pub fn unset_cache(&self, item: &FileItem) -> Result<(), CacheError> {
        let conn = self.conn.lock_unpoisoned();
        conn.execute("DELETE FROM migrated WHERE id = ?1", params![item.id])?;
        Ok(())
    }
}
