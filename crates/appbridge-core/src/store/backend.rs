//! Key-value persistence surface for endpoint records.

use crate::config::StoreConfig;
use crate::error::{BridgeError, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A durable string-per-key store.
///
/// All operations are synchronous to match rusqlite's API. A successful
/// `put` must be durable before it returns.
pub trait RecordBackend: Send + Sync {
    /// Load every stored `(key, value)` pair.
    fn load_all(&self) -> Result<Vec<(String, String)>>;

    /// Insert or replace the value for a key.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Returns `true` if it existed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// SQLite-backed record store.
///
/// Runs with `synchronous=FULL` so a committed write survives a crash, and
/// keeps the connection behind `Arc<Mutex<_>>` for thread safety.
pub struct SqliteRecordBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordBackend {
    /// Open the store at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| BridgeError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=FULL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS endpoint_records (
                app_name TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BridgeError::Database {
            message: "Failed to acquire record store connection lock".to_string(),
            source: None,
        })
    }
}

impl RecordBackend for SqliteRecordBackend {
    fn load_all(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT app_name, record FROM endpoint_records ORDER BY app_name")?;

        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO endpoint_records (app_name, record, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(app_name) DO UPDATE SET
                 record=excluded.record,
                 updated_at=excluded.updated_at",
            params![key, value, now],
        )?;
        debug!("Stored endpoint record for {}", key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let rows = conn.execute(
            "DELETE FROM endpoint_records WHERE app_name = ?1",
            params![key],
        )?;
        if rows > 0 {
            debug!("Removed endpoint record for {}", key);
        }
        Ok(rows > 0)
    }
}
