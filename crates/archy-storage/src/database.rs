// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tracing::debug;

use archy_core::{AdapterType, ArchyError, HealthStatus, PluginAdapter};

use crate::migrations::run_migrations;

/// Handle to the two-tier SQLite database.
///
/// Cloning is cheap: every clone talks to the same background writer thread,
/// which is what serializes check-and-set updates across concurrent callers.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, ArchyError> {
        Self::open_with(path, true).await
    }

    /// Open the database at `path`, choosing the journal mode explicitly.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, ArchyError> {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ArchyError::storage)?;
        }

        let conn = Connection::open(path).await.map_err(ArchyError::storage)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, ArchyError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(ArchyError::storage)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), ArchyError> {
        self.conn
            .call(move |conn| -> Result<(), ArchyError> {
                if wal_mode {
                    let mode: String = conn
                        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                        .map_err(ArchyError::storage)?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.execute_batch(
                    "PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;",
                )
                .map_err(ArchyError::storage)?;
                conn.busy_timeout(Duration::from_secs(5))
                    .map_err(ArchyError::storage)?;
                run_migrations(conn)
            })
            .await
            .map_err(flatten_call_err)
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), ArchyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

/// Convert a tokio-rusqlite error carrying a plain rusqlite error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> ArchyError {
    ArchyError::Storage {
        source: Box::new(e),
    }
}

/// Unwrap an [`ArchyError`] raised inside a `call` closure; connection-level
/// failures become storage errors.
pub fn flatten_call_err(e: tokio_rusqlite::Error<ArchyError>) -> ArchyError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => ArchyError::storage(other.to_string()),
    }
}
