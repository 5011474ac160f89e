// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-credential access-token lifecycle.
//!
//! State per credential: `Unknown -> Valid -> ExpiringSoon -> Refreshing ->
//! Valid | Failed`. A token with no expiry, or one expiring within
//! [`REFRESH_MARGIN_SECS`], is refreshed before use. Refreshes take a
//! per-credential mutex and re-read the credential once inside it, so
//! concurrent callers coalesce into one `/token/` call. The mutex is never
//! held while the caller's closure runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use omnichat_core::{OmnichatError, TokenEndpoint, TokenGrant, TokenResponse};
use omnichat_vault::{CredentialView, Vault};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh when fewer than this many seconds remain.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when a token response carries no `expires_in`.
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unknown,
    Valid,
    ExpiringSoon,
    Refreshing,
    /// Refresh was rejected; the credential needs re-authorization.
    Failed(String),
}

/// Keeps access tokens valid for stored credentials.
pub struct TokenManager {
    vault: Arc<Vault>,
    /// Token endpoints by channel id. Channels without one use static tokens.
    endpoints: HashMap<i64, Arc<dyn TokenEndpoint>>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    states: DashMap<i64, TokenState>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("channels", &self.endpoints.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self {
            vault,
            endpoints: HashMap::new(),
            locks: DashMap::new(),
            states: DashMap::new(),
        }
    }

    /// Register the token endpoint for an OAuth-backed channel.
    pub fn with_endpoint(mut self, channel_id: i64, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoints.insert(channel_id, endpoint);
        self
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    pub fn state(&self, credential_id: i64) -> TokenState {
        self.states
            .get(&credential_id)
            .map(|s| s.clone())
            .unwrap_or(TokenState::Unknown)
    }

    fn set_state(&self, credential_id: i64, state: TokenState) {
        self.states.insert(credential_id, state);
    }

    fn lock_for(&self, credential_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(credential_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` with a valid access token, refreshing first if needed.
    ///
    /// If `f` fails with a platform 401, the token is refreshed and `f` runs
    /// exactly once more.
    pub async fn with_access_token<T, F, Fut>(
        &self,
        credential_id: i64,
        f: F,
    ) -> Result<T, OmnichatError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, OmnichatError>>,
    {
        let token = self.access_token(credential_id).await?;
        match f(token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                warn!(credential_id, "access token rejected; refreshing once");
                let fresh = self.force_refresh(credential_id, &token).await?;
                f(fresh).await
            }
            other => other,
        }
    }

    /// A currently valid access token for the credential.
    pub async fn access_token(&self, credential_id: i64) -> Result<String, OmnichatError> {
        let credential = self.vault.load_by_id(credential_id).await?;
        if !needs_refresh(&credential) {
            self.set_state(credential_id, TokenState::Valid);
            return Ok(credential.access_token.expose_secret().to_string());
        }
        let Some(endpoint) = self.endpoints.get(&credential.channel_id).cloned() else {
            return static_token(&credential);
        };
        self.set_state(credential_id, TokenState::ExpiringSoon);

        let lock = self.lock_for(credential_id);
        let _guard = lock.lock().await;
        // Another caller may have refreshed while we waited.
        let credential = self.vault.load_by_id(credential_id).await?;
        if !needs_refresh(&credential) {
            self.set_state(credential_id, TokenState::Valid);
            return Ok(credential.access_token.expose_secret().to_string());
        }
        self.refresh_locked(&credential, endpoint.as_ref()).await
    }

    /// Refresh after the platform rejected `stale`.
    async fn force_refresh(&self, credential_id: i64, stale: &str) -> Result<String, OmnichatError> {
        let credential = self.vault.load_by_id(credential_id).await?;
        let Some(endpoint) = self.endpoints.get(&credential.channel_id).cloned() else {
            return Err(OmnichatError::TokenExpired {
                credential_id,
                reason: "platform rejected a static token".to_string(),
            });
        };

        let lock = self.lock_for(credential_id);
        let _guard = lock.lock().await;
        let credential = self.vault.load_by_id(credential_id).await?;
        let current = credential.access_token.expose_secret();
        if !current.is_empty() && current != stale {
            debug!(credential_id, "token already rotated by another caller");
            return Ok(current.to_string());
        }
        self.refresh_locked(&credential, endpoint.as_ref()).await
    }

    /// Exchange and persist. Caller holds the credential's mutex.
    async fn refresh_locked(
        &self,
        credential: &CredentialView,
        endpoint: &dyn TokenEndpoint,
    ) -> Result<String, OmnichatError> {
        let credential_id = credential.id;
        self.set_state(credential_id, TokenState::Refreshing);

        let grant = match refresh_grant(credential) {
            Ok(grant) => grant,
            Err(e) => {
                self.set_state(credential_id, TokenState::Failed(e.to_string()));
                return Err(e);
            }
        };
        let grant_type = grant.grant_type();
        let response = match endpoint.exchange(grant).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                warn!(credential_id, error = %e, "token refresh failed transiently");
                self.set_state(credential_id, TokenState::ExpiringSoon);
                return Err(e);
            }
            Err(e) => {
                warn!(credential_id, grant_type, error = %e, "token refresh rejected");
                let reason = e.to_string();
                self.set_state(credential_id, TokenState::Failed(reason.clone()));
                return Err(OmnichatError::TokenExpired {
                    credential_id,
                    reason,
                });
            }
        };

        let expires_at = expires_at(&response);
        self.vault
            .store_tokens(
                credential_id,
                &response.access_token,
                response.refresh_token.as_deref(),
                Some(&expires_at),
            )
            .await?;
        info!(credential_id, grant_type, %expires_at, "access token refreshed");
        self.set_state(credential_id, TokenState::Valid);
        Ok(response.access_token)
    }

    /// One-shot grant exchange on a channel's endpoint, used by connect and
    /// OAuth callback flows. Nothing is persisted.
    pub async fn exchange(
        &self,
        channel_id: i64,
        grant: TokenGrant,
    ) -> Result<TokenResponse, OmnichatError> {
        let endpoint = self.endpoints.get(&channel_id).ok_or_else(|| {
            OmnichatError::Config(format!("channel {channel_id} has no token endpoint"))
        })?;
        endpoint.exchange(grant).await
    }
}

fn needs_refresh(credential: &CredentialView) -> bool {
    if !credential.has_access_token() {
        return true;
    }
    let Some(expires) = credential
        .token_expires_at
        .as_deref()
        .and_then(omnichat_core::time::parse)
    else {
        return true;
    };
    expires <= Utc::now() + chrono::Duration::seconds(REFRESH_MARGIN_SECS)
}

fn static_token(credential: &CredentialView) -> Result<String, OmnichatError> {
    if credential.has_access_token() {
        Ok(credential.access_token.expose_secret().to_string())
    } else {
        Err(OmnichatError::TokenExpired {
            credential_id: credential.id,
            reason: "credential has no access token".to_string(),
        })
    }
}

/// `refresh_token` when one is stored, else `client_credentials`.
fn refresh_grant(credential: &CredentialView) -> Result<TokenGrant, OmnichatError> {
    let client_id = credential.api_key.expose_secret().to_string();
    let client_secret = credential.api_secret.expose_secret().to_string();
    if credential.has_refresh_token() {
        return Ok(TokenGrant::RefreshToken {
            client_id,
            client_secret,
            refresh_token: credential.refresh_token.expose_secret().to_string(),
        });
    }
    if client_id.is_empty() {
        return Err(OmnichatError::TokenExpired {
            credential_id: credential.id,
            reason: "no refresh token or client credentials".to_string(),
        });
    }
    Ok(TokenGrant::ClientCredentials {
        client_id,
        client_secret,
    })
}

/// Absolute expiry for a token response.
pub fn expires_at(response: &TokenResponse) -> String {
    let lifetime = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    omnichat_core::time::format(Utc::now() + chrono::Duration::seconds(lifetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use omnichat_core::types::ChannelType;
    use omnichat_storage::Database;
    use omnichat_storage::queries::channels;
    use omnichat_vault::CredentialPatch;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zeroize::Zeroizing;

    use crate::OAuthTokenClient;

    async fn vault() -> (Arc<Vault>, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let ch = channels::ensure_channel(&db, ChannelType::Avito, "Avito")
            .await
            .unwrap();
        let key = Zeroizing::new([7u8; 32]);
        (Arc::new(Vault::with_key(db, key).await.unwrap()), ch.id)
    }

    async fn credential(vault: &Vault, channel_id: i64, expires_in_secs: i64) -> i64 {
        let expires = omnichat_core::time::format(Utc::now() + chrono::Duration::seconds(expires_in_secs));
        vault
            .save(CredentialPatch {
                channel_id,
                tenant_id: 1,
                external_account_id: "42".into(),
                api_key: Some("cid".into()),
                api_secret: Some("secret".into()),
                access_token: Some("old-token".into()),
                refresh_token: Some("refresh".into()),
                token_expires_at: Some(expires),
                redirect_uri: None,
            })
            .await
            .unwrap()
            .id
    }

    /// Counts exchanges and hands out numbered tokens.
    struct CountingEndpoint {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenEndpoint for CountingEndpoint {
        async fn exchange(&self, _grant: TokenGrant) -> Result<TokenResponse, OmnichatError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(OmnichatError::Platform {
                    status: 400,
                    message: "invalid_grant".into(),
                });
            }
            Ok(TokenResponse {
                access_token: format!("token-{n}"),
                refresh_token: None,
                expires_in: Some(3600),
            })
        }
    }

    fn counting(fail: bool) -> Arc<CountingEndpoint> {
        Arc::new(CountingEndpoint {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn fresh_token_is_not_refreshed() {
        let (vault, ch) = vault().await;
        let id = credential(&vault, ch, 3600).await;
        let endpoint = counting(false);
        let manager = TokenManager::new(vault).with_endpoint(ch, endpoint.clone());

        let token = manager
            .with_access_token(id, |t| async move { Ok::<_, OmnichatError>(t) })
            .await
            .unwrap();
        assert_eq!(token, "old-token");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(id), TokenState::Valid);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_persisted() {
        let (vault, ch) = vault().await;
        let id = credential(&vault, ch, 120).await;
        let endpoint = counting(false);
        let manager = TokenManager::new(vault.clone()).with_endpoint(ch, endpoint.clone());

        let token = manager.access_token(id).await.unwrap();
        assert_eq!(token, "token-1");
        let stored = vault.load_by_id(id).await.unwrap();
        assert_eq!(stored.access_token.expose_secret(), "token-1");
        assert_eq!(stored.refresh_token.expose_secret(), "refresh");
    }

    #[tokio::test]
    async fn unauthorized_retries_once_with_new_token() {
        let (vault, ch) = vault().await;
        let id = credential(&vault, ch, 3600).await;
        let endpoint = counting(false);
        let manager = TokenManager::new(vault).with_endpoint(ch, endpoint.clone());
        let attempts = AtomicUsize::new(0);

        let result = manager
            .with_access_token(id, |token| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        assert_eq!(token, "old-token");
                        Err(OmnichatError::Platform {
                            status: 401,
                            message: "unauthorized".into(),
                        })
                    } else {
                        Ok(token)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "token-1");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_is_token_expired_and_failed() {
        let (vault, ch) = vault().await;
        let id = credential(&vault, ch, 60).await;
        let manager = TokenManager::new(vault).with_endpoint(ch, counting(true));

        let err = manager.access_token(id).await.unwrap_err();
        assert!(matches!(err, OmnichatError::TokenExpired { credential_id, .. } if credential_id == id));
        assert!(matches!(manager.state(id), TokenState::Failed(_)));
    }

    #[tokio::test]
    async fn static_tokens_are_never_refreshed() {
        let (vault, ch) = vault().await;
        let id = vault
            .save(CredentialPatch {
                channel_id: ch,
                tenant_id: 1,
                external_account_id: "bot".into(),
                access_token: Some("bot-token".into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id;
        let manager = TokenManager::new(vault);
        assert_eq!(manager.access_token(id).await.unwrap(), "bot-token");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "access_token": "fresh-token",
                        "expires_in": 3600
                    }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (vault, ch) = vault().await;
        let id = credential(&vault, ch, 120).await;
        let endpoint = Arc::new(OAuthTokenClient::new(&server.uri(), Duration::from_secs(5)).unwrap());
        let manager = Arc::new(TokenManager::new(vault).with_endpoint(ch, endpoint));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .with_access_token(id, |t| async move { Ok::<_, OmnichatError>(t) })
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), "fresh-token");
        }
        // MockServer verifies `.expect(1)` on drop.
    }
}
