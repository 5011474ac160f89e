// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory bus, identity and object-store collaborators.

use std::collections::HashMap;

use async_trait::async_trait;
use omnichat_core::types::{AdapterType, HealthStatus, Identity};
use omnichat_core::{BusPublisher, IdentityResolver, MediaStore, OmnichatError, PluginAdapter};
use serde_json::Value;
use tokio::sync::Mutex;

/// Captures every bus publish as `(routing_key, payload)`.
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, Value)>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().await.clone()
    }

    /// Payloads published under `routing_key`, in order.
    pub async fn on(&self, routing_key: &str) -> Vec<Value> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.published.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for MemoryBus {
    fn name(&self) -> &str {
        "memory-bus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bus
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), OmnichatError> {
        self.published
            .lock()
            .await
            .push((routing_key.to_string(), payload.clone()));
        Ok(())
    }
}

/// Fixed token to identity table.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, user_id: i64, tenant_id: i64) -> Self {
        self.tokens.insert(
            token.to_string(),
            Identity {
                user_id,
                tenant_id,
                is_owner: false,
                name: None,
            },
        );
        self
    }
}

#[async_trait]
impl PluginAdapter for StaticIdentity {
    fn name(&self) -> &str {
        "static-identity"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Identity
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, token: &str) -> Result<Identity, OmnichatError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| OmnichatError::AccessDenied {
                reason: "invalid token".into(),
            })
    }
}

/// Object store backed by a map. Keys are `test/{n}_{filename}`.
#[derive(Default)]
pub struct MemoryMediaStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.lock().await.get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl PluginAdapter for MemoryMediaStore {
    fn name(&self) -> &str {
        "memory-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaStore
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, OmnichatError> {
        let mut blobs = self.blobs.lock().await;
        let key = format!("test/{}_{filename}", blobs.len());
        blobs.insert(key.clone(), (bytes, content_type.to_string()));
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, OmnichatError> {
        Ok(self.blobs.lock().await.get(key).map(|(b, _)| b.clone()))
    }
}
