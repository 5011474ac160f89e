// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem object store.
//!
//! Keys look like `chats_files/2026/10/17/1a2b3c4d_photo.jpg` and are
//! served by the gateway under `/api/v1/photos/{key}`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use omnichat_config::model::MediaConfig;
use omnichat_core::{AdapterType, HealthStatus, MediaStore, OmnichatError, PluginAdapter};
use tracing::debug;

const KEY_PREFIX: &str = "chats_files";

#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(media: &MediaConfig) -> Self {
        Self::new(&media.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a key, or `None` when the key escapes the root.
    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (safe && !key.is_empty()).then(|| self.root.join(relative))
    }
}

/// Keep a filename to a single safe path segment.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

#[async_trait]
impl PluginAdapter for FsMediaStore {
    fn name(&self) -> &str {
        "fs-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaStore
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy(format!("{} is not a directory", self.root.display())),
            Err(_) => HealthStatus::Degraded(format!("{} does not exist yet", self.root.display())),
        })
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, OmnichatError> {
        let date = chrono::Utc::now().format("%Y/%m/%d");
        let id = uuid::Uuid::new_v4().simple().to_string();
        let key = format!(
            "{KEY_PREFIX}/{date}/{}_{}",
            &id[..8],
            sanitize_filename(filename)
        );
        let path = self
            .path_for(&key)
            .ok_or_else(|| OmnichatError::Internal(format!("unsafe media key {key}")))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OmnichatError::Storage { source: Box::new(e) })?;
        }
        let len = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| OmnichatError::Storage { source: Box::new(e) })?;
        debug!(key, len, content_type, "media stored");
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, OmnichatError> {
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OmnichatError::Storage { source: Box::new(e) }),
        }
    }
}
