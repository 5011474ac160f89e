// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator identity resolution.
//!
//! Tokens resolve through an external identity service when one is
//! configured, then through the static operator table from the config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use omnichat_config::model::{GatewayConfig, HttpConfig, OperatorConfig};
use omnichat_core::types::{AdapterType, HealthStatus, Identity};
use omnichat_core::{IdentityResolver, OmnichatError, PluginAdapter};
use omnichat_token::http;
use reqwest::StatusCode;
use tracing::debug;

/// How long a resolved token is trusted without asking the service again.
pub const IDENTITY_TTL: Duration = Duration::from_secs(60);

/// Static token table from `[[gateway.operators]]`.
#[derive(Default)]
pub struct OperatorTable {
    tokens: HashMap<String, Identity>,
}

impl std::fmt::Debug for OperatorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorTable")
            .field("operators", &self.tokens.len())
            .finish()
    }
}

impl OperatorTable {
    pub fn new(operators: &[OperatorConfig]) -> Self {
        let tokens = operators
            .iter()
            .filter(|op| !op.token.is_empty())
            .map(|op| {
                (
                    op.token.clone(),
                    Identity {
                        user_id: op.user_id,
                        tenant_id: op.tenant_id,
                        is_owner: op.is_owner,
                        name: op.name.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for OperatorTable {
    fn name(&self) -> &str {
        "operator-table"
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
impl IdentityResolver for OperatorTable {
    async fn resolve(&self, token: &str) -> Result<Identity, OmnichatError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| OmnichatError::AccessDenied {
                reason: "unknown operator token".to_string(),
            })
    }
}

/// Asks `GET {url}` with the operator's bearer token for an [`Identity`].
///
/// 401, 403 and 404 mean the token is not valid. Successful lookups are
/// cached for [`IDENTITY_TTL`].
pub struct HttpIdentity {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    cache: Cache<String, Identity>,
}

impl std::fmt::Debug for HttpIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentity")
            .field("url", &self.url)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl HttpIdentity {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, OmnichatError> {
        Self::with_ttl(url, timeout, IDENTITY_TTL)
    }

    pub fn with_ttl(url: &str, timeout: Duration, ttl: Duration) -> Result<Self, OmnichatError> {
        url::Url::parse(url)
            .map_err(|e| OmnichatError::Config(format!("invalid gateway.identity_url: {e}")))?;
        Ok(Self {
            client: http::build_client(timeout)?,
            url: url.to_string(),
            timeout,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        })
    }

    async fn fetch(&self, token: &str) -> Result<Identity, OmnichatError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Err(OmnichatError::AccessDenied {
                reason: format!("identity service rejected the token ({status})"),
            });
        }
        let body = http::parse_response(response, self.timeout).await?;
        serde_json::from_value(body)
            .map_err(|e| OmnichatError::Validation(format!("identity response: {e}")))
    }
}

#[async_trait]
impl PluginAdapter for HttpIdentity {
    fn name(&self) -> &str {
        "http-identity"
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
impl IdentityResolver for HttpIdentity {
    async fn resolve(&self, token: &str) -> Result<Identity, OmnichatError> {
        if let Some(identity) = self.cache.get(token).await {
            return Ok(identity);
        }
        let identity = self.fetch(token).await?;
        debug!(user_id = identity.user_id, tenant_id = identity.tenant_id, "operator resolved");
        self.cache.insert(token.to_string(), identity.clone()).await;
        Ok(identity)
    }
}

/// Tries each resolver in order. Only [`OmnichatError::AccessDenied`] falls
/// through to the next one; any other failure is returned as is.
pub struct IdentityChain {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl IdentityChain {
    pub fn new(resolvers: Vec<Arc<dyn IdentityResolver>>) -> Self {
        Self { resolvers }
    }

    /// External service first, then static operators.
    pub fn from_config(gateway: &GatewayConfig, http_config: &HttpConfig) -> Result<Self, OmnichatError> {
        let mut resolvers: Vec<Arc<dyn IdentityResolver>> = Vec::new();
        if let Some(url) = gateway.identity_url.as_deref().filter(|u| !u.is_empty()) {
            resolvers.push(Arc::new(HttpIdentity::new(
                url,
                Duration::from_secs(http_config.timeout_secs),
            )?));
        }
        let table = OperatorTable::new(&gateway.operators);
        if !table.is_empty() {
            resolvers.push(Arc::new(table));
        }
        Ok(Self::new(resolvers))
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for IdentityChain {
    fn name(&self) -> &str {
        "identity-chain"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Identity
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        if self.resolvers.is_empty() {
            return Ok(HealthStatus::Degraded("no identity resolver configured".into()));
        }
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl IdentityResolver for IdentityChain {
    async fn resolve(&self, token: &str) -> Result<Identity, OmnichatError> {
        for resolver in &self.resolvers {
            match resolver.resolve(token).await {
                Err(OmnichatError::AccessDenied { .. }) => continue,
                other => return other,
            }
        }
        Err(OmnichatError::AccessDenied {
            reason: "invalid token".to_string(),
        })
    }
}
