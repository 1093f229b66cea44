// Database manager
// Owns the SQLite connection and provides access to the repositories

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StorageError;

use super::migrations;

/// Database manager that owns the SQLite connection
///
/// Writes are serialized through the connection mutex; the pipeline and chat
/// manager are the only writers and each touches disjoint rows.
pub struct DatabaseManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DatabaseManager {
    /// Open (or create) the database at the specified path
    pub fn new(db_path: PathBuf) -> Result<Self, StorageError> {
        let conn = Self::open(&db_path).map_err(StorageError)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open the database under the platform data directory
    pub fn with_default_path() -> Result<Self, StorageError> {
        let data_dir = dirs::data_dir()
            .context("failed to resolve platform data directory")
            .map_err(StorageError)?;
        Self::new(data_dir.join("vidscribe").join("vidscribe.db"))
    }

    fn open(db_path: &PathBuf) -> Result<Connection> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database")?;

        // Cascading deletes depend on this
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        migrations::run_migrations(&conn).context("Failed to run database migrations")?;

        log::info!("Database initialized at: {:?}", db_path);
        Ok(conn)
    }

    /// Execute a function with access to the database connection
    ///
    /// Errors inside `f` surface as `StorageError`, the typed boundary the
    /// rest of the crate sees.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError(anyhow::anyhow!("Failed to lock database connection: {}", e)))?;
        f(&conn).map_err(StorageError)
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}
