// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lets `/health` check the database like any other collaborator.

use async_trait::async_trait;
use omnichat_core::{AdapterType, HealthStatus, OmnichatError, PluginAdapter};
use tracing::debug;

use crate::database::Database;

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    /// Round-trips a pragma through the writer connection. A connection that
    /// lost `foreign_keys` still answers but would let orphan messages in.
    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        let pragma = self
            .connection()
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get::<_, bool>(0)))
            .await;
        Ok(match pragma {
            Ok(true) => HealthStatus::Healthy,
            Ok(false) => HealthStatus::Degraded("foreign key enforcement is off".to_string()),
            Err(e) => HealthStatus::Unhealthy(format!("{} unreachable: {e}", self.path())),
        })
    }

    async fn shutdown(&self) -> Result<(), OmnichatError> {
        self.checkpoint().await?;
        debug!(path = self.path(), "wal checkpointed on shutdown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_database_is_healthy() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.adapter_type(), AdapterType::Storage);
        assert_eq!(db.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn disabled_foreign_keys_degrade_health() {
        let db = Database::open(":memory:").await.unwrap();
        db.connection()
            .call(|conn| conn.execute_batch("PRAGMA foreign_keys = OFF;"))
            .await
            .unwrap();
        assert!(matches!(db.health_check().await.unwrap(), HealthStatus::Degraded(_)));
    }

    #[tokio::test]
    async fn shutdown_checkpoints_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.shutdown().await.unwrap();
        assert!(path.exists());
    }
}
