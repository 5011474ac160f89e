// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread. Query
//! modules take `&Database` and go through [`Database::connection`]; do not
//! open extra connections for writes.

use std::path::Path;
use std::time::Duration;

use omnichat_config::model::StorageConfig;
use omnichat_core::OmnichatError;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Handle to the chat database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database at `path` with default settings.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, OmnichatError> {
        Self::open_with(path, Duration::from_millis(5000)).await
    }

    /// Open using the `[storage]` section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, OmnichatError> {
        Self::open_with(
            &config.database_path,
            Duration::from_millis(config.busy_timeout_ms),
        )
        .await
    }

    pub async fn open_with(path: &str, busy_timeout: Duration) -> Result<Self, OmnichatError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().await
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    OmnichatError::storage(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            Connection::open(path).await
        }
        .map_err(|e| OmnichatError::storage(format!("cannot open database {path}: {e}")))?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let applied = conn
            .call(crate::migrations::run_migrations)
            .await
            .map_err(|e| OmnichatError::Storage {
                source: Box::new(e),
            })?;

        info!(path, applied, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// Underlying async connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), OmnichatError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), OmnichatError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| OmnichatError::storage(format!("close failed: {e}")))
    }
}

/// Helper to convert tokio-rusqlite errors into [`OmnichatError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> OmnichatError {
    OmnichatError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |r| r.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for t in [
            "channel_credentials",
            "channels",
            "chat_contacts",
            "chat_messages",
            "chats",
            "pictures",
            "vault_meta",
        ] {
            assert!(tables.iter().any(|n| n == t), "missing table {t}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_enforced() {
        let db = Database::open(":memory:").await.unwrap();
        let result = db
            .connection()
            .call(|conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO chat_messages (chat_id, sender_type, content, message_type, status, source, created_at, updated_at)
                     VALUES (999, 'CLIENT', 'x', 'TEXT', 'SENT', 'api', 't', 't')",
                    [],
                )
            })
            .await;
        assert!(result.is_err());
    }
}
