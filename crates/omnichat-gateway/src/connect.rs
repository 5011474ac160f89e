// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel connection flows.
//!
//! Connecting a channel always learns the platform account id first, so the
//! stored credential can tell operator messages from client messages.

use std::sync::Arc;

use omnichat_avito::AvitoFactory;
use omnichat_config::model::{AvitoBootstrapConfig, AvitoConfig};
use omnichat_core::types::{ChannelType, TenantId};
use omnichat_core::{OmnichatError, PlatformClient, TokenGrant, TokenResponse};
use omnichat_ingest::TelegramUpdateHandler;
use omnichat_telegram::TelegramFactory;
use omnichat_token::TokenManager;
use omnichat_token::manager::expires_at;
use omnichat_vault::{CredentialPatch, Vault};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

/// Scopes requested by the browser authorization flow.
pub const AVITO_SCOPES: &str = "messenger:read,messenger:write,user:read";

fn default_true() -> bool {
    true
}

/// Body of `POST /chats/avito/connect`.
///
/// Without an access token the client pair is exchanged through the
/// `client_credentials` grant. Missing client fields fall back to the
/// application credentials from the config.
#[derive(Clone, Default, Deserialize)]
pub struct AvitoConnectRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_true")]
    pub register_webhook: bool,
}

impl std::fmt::Debug for AvitoConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvitoConnectRequest")
            .field("client_id", &self.client_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("register_webhook", &self.register_webhook)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvitoConnection {
    pub success: bool,
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub credential_id: i64,
    pub external_account_id: String,
    pub token_expires_at: Option<String>,
    pub webhook_url: String,
    pub webhook_registered: bool,
}

/// Credential setup for the OAuth-backed platform.
pub struct AvitoConnect {
    factory: AvitoFactory,
    tokens: Arc<TokenManager>,
    channel_id: i64,
    client_id: Option<String>,
    client_secret: Option<String>,
    authorize_url: String,
    redirect_uri: Option<String>,
    public_base_url: String,
}

impl std::fmt::Debug for AvitoConnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvitoConnect")
            .field("channel_id", &self.channel_id)
            .field("client_id", &self.client_id)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl AvitoConnect {
    pub fn new(
        factory: AvitoFactory,
        tokens: Arc<TokenManager>,
        channel_id: i64,
        config: &AvitoConfig,
        public_base_url: &str,
    ) -> Self {
        Self {
            factory,
            tokens,
            channel_id,
            client_id: config.client_id.clone().filter(|s| !s.is_empty()),
            client_secret: config.client_secret.clone().filter(|s| !s.is_empty()),
            authorize_url: config.authorize_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn vault(&self) -> &Arc<Vault> {
        self.tokens.vault()
    }

    /// Default webhook target for a tenant.
    pub fn webhook_url(&self, tenant_id: TenantId) -> String {
        format!("{}/chats/avito/webhooks/{tenant_id}", self.public_base_url)
    }

    /// Personal-grant connect: obtain a token, learn the account, store the
    /// credential and optionally register the default webhook.
    pub async fn connect(
        &self,
        tenant_id: TenantId,
        request: AvitoConnectRequest,
    ) -> Result<AvitoConnection, OmnichatError> {
        let client_id = request
            .client_id
            .filter(|s| !s.is_empty())
            .or_else(|| self.client_id.clone())
            .unwrap_or_default();
        let client_secret = request
            .client_secret
            .filter(|s| !s.is_empty())
            .or_else(|| self.client_secret.clone())
            .unwrap_or_default();

        let tokens = match (request.access_token.filter(|t| !t.is_empty()), request.refresh_token) {
            (Some(access_token), refresh_token) => TokenResponse {
                access_token,
                refresh_token,
                expires_in: None,
            },
            (None, Some(refresh_token)) if !refresh_token.is_empty() => {
                self.require_client(&client_id)?;
                self.tokens
                    .exchange(
                        self.channel_id,
                        TokenGrant::RefreshToken {
                            client_id: client_id.clone(),
                            client_secret: client_secret.clone(),
                            refresh_token,
                        },
                    )
                    .await?
            }
            _ => {
                self.require_client(&client_id)?;
                self.tokens
                    .exchange(
                        self.channel_id,
                        TokenGrant::ClientCredentials {
                            client_id: client_id.clone(),
                            client_secret: client_secret.clone(),
                        },
                    )
                    .await?
            }
        };

        self.store(
            tenant_id,
            client_id,
            client_secret,
            tokens,
            None,
            request.register_webhook,
        )
        .await
    }

    fn require_client(&self, client_id: &str) -> Result<(), OmnichatError> {
        if client_id.is_empty() {
            return Err(OmnichatError::Validation(
                "client_id and client_secret are required without an access_token".into(),
            ));
        }
        Ok(())
    }

    /// Browser authorization link. `state` carries the tenant id back to the
    /// callback.
    pub fn authorize_url(&self, tenant_id: TenantId) -> Result<String, OmnichatError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| OmnichatError::Config("avito.client_id is not configured".into()))?;
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| OmnichatError::Config(format!("invalid avito.authorize_url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("scope", AVITO_SCOPES)
                .append_pair("state", &tenant_id.to_string());
            if let Some(redirect_uri) = &self.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
        }
        Ok(url.into())
    }

    /// Authorization-code callback. Reconnecting the same account for the
    /// same tenant updates the existing credential.
    pub async fn complete_oauth(
        &self,
        code: &str,
        state: &str,
    ) -> Result<AvitoConnection, OmnichatError> {
        let tenant_id: TenantId = state
            .trim()
            .parse()
            .map_err(|_| OmnichatError::Validation(format!("invalid oauth state: {state}")))?;
        if code.trim().is_empty() {
            return Err(OmnichatError::Validation("missing authorization code".into()));
        }
        let client_id = self.client_id.clone().unwrap_or_default();
        let client_secret = self.client_secret.clone().unwrap_or_default();
        self.require_client(&client_id)?;

        let tokens = self
            .tokens
            .exchange(
                self.channel_id,
                TokenGrant::AuthorizationCode {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    code: code.to_string(),
                    redirect_uri: self.redirect_uri.clone(),
                },
            )
            .await?;
        // Refreshes of this credential use the application pair, which the
        // token client fills in when the stored pair is empty.
        self.store(
            tenant_id,
            String::new(),
            String::new(),
            tokens,
            self.redirect_uri.clone(),
            true,
        )
        .await
    }

    /// Upsert the credential from `[avito.bootstrap]`.
    pub async fn bootstrap(
        &self,
        config: &AvitoBootstrapConfig,
    ) -> Result<AvitoConnection, OmnichatError> {
        info!(tenant_id = config.tenant_id, "bootstrapping avito credential");
        self.connect(
            config.tenant_id,
            AvitoConnectRequest {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                access_token: config.access_token.clone(),
                refresh_token: config.refresh_token.clone(),
                register_webhook: config.register_webhook,
            },
        )
        .await
    }

    async fn store(
        &self,
        tenant_id: TenantId,
        client_id: String,
        client_secret: String,
        tokens: TokenResponse,
        redirect_uri: Option<String>,
        register_webhook: bool,
    ) -> Result<AvitoConnection, OmnichatError> {
        let profile = self.factory.profile_for_token(&tokens.access_token).await?;
        let token_expires_at = expires_at(&tokens);
        let view = self
            .vault()
            .save(CredentialPatch {
                channel_id: self.channel_id,
                tenant_id,
                external_account_id: profile.external_account_id.clone(),
                api_key: Some(client_id),
                api_secret: Some(client_secret),
                access_token: Some(tokens.access_token),
                refresh_token: tokens.refresh_token,
                token_expires_at: Some(token_expires_at.clone()),
                redirect_uri,
            })
            .await?;
        info!(
            tenant_id,
            credential_id = view.id,
            external_account_id = %view.external_account_id,
            "avito credential stored"
        );

        let webhook_url = self.webhook_url(tenant_id);
        let webhook_registered = if register_webhook {
            let client = self.factory.client(&view.credential_ref(ChannelType::Avito));
            match client.register_webhook(&webhook_url).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(tenant_id, credential_id = view.id, error = %e, "webhook registration failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(AvitoConnection {
            success: true,
            channel_id: self.channel_id,
            tenant_id,
            credential_id: view.id,
            external_account_id: view.external_account_id,
            token_expires_at: Some(token_expires_at),
            webhook_url,
            webhook_registered,
        })
    }
}

/// Body of `POST /chats/telegram/connect`.
#[derive(Clone, Deserialize)]
pub struct TelegramConnectRequest {
    pub bot_token: String,
}

impl std::fmt::Debug for TelegramConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConnectRequest")
            .field("bot_token", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelegramConnection {
    pub success: bool,
    pub channel_id: i64,
    pub credential_id: i64,
    pub bot_id: String,
    pub bot_username: Option<String>,
    /// `None` when updates arrive through polling.
    pub webhook_url: Option<String>,
}

/// Bot registration, status and webhook delivery for Telegram.
pub struct TelegramConnect {
    factory: TelegramFactory,
    handler: Arc<TelegramUpdateHandler>,
    channel_id: i64,
    public_base_url: String,
    polling: bool,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for TelegramConnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConnect")
            .field("channel_id", &self.channel_id)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl TelegramConnect {
    pub fn new(
        factory: TelegramFactory,
        handler: Arc<TelegramUpdateHandler>,
        channel_id: i64,
        public_base_url: &str,
    ) -> Self {
        Self {
            factory,
            handler,
            channel_id,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            polling: false,
            webhook_secret: None,
        }
    }

    pub fn with_polling(mut self, polling: bool) -> Self {
        self.polling = polling;
        self
    }

    /// Expected `X-Telegram-Bot-Api-Secret-Token`.
    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    fn vault(&self) -> &Arc<Vault> {
        self.factory.tokens().vault()
    }

    pub fn webhook_url(&self, credential_id: i64) -> String {
        format!("{}/chats/telegram/webhook/{credential_id}", self.public_base_url)
    }

    /// Check the token with `getMe`. Errors here mean the token is unusable.
    pub async fn verify(&self, bot_token: &str) -> Result<(String, Option<String>), OmnichatError> {
        let profile = self.factory.profile_for_token(bot_token).await?;
        Ok((profile.external_account_id, profile.display_name))
    }

    /// Store the bot token and, unless polling, point the bot's webhook here.
    pub async fn connect(
        &self,
        tenant_id: TenantId,
        bot_token: &str,
        bot_id: String,
        bot_username: Option<String>,
    ) -> Result<TelegramConnection, OmnichatError> {
        let view = self
            .vault()
            .save(CredentialPatch {
                channel_id: self.channel_id,
                tenant_id,
                external_account_id: bot_id.clone(),
                access_token: Some(bot_token.to_string()),
                ..CredentialPatch::default()
            })
            .await?;
        info!(tenant_id, credential_id = view.id, bot_id = %bot_id, "telegram bot stored");

        let webhook_url = if self.polling {
            None
        } else {
            let url = self.webhook_url(view.id);
            self.factory
                .client(&view.credential_ref(ChannelType::Telegram))
                .register_webhook(&url)
                .await?;
            Some(url)
        };

        Ok(TelegramConnection {
            success: true,
            channel_id: self.channel_id,
            credential_id: view.id,
            bot_id,
            bot_username,
            webhook_url,
        })
    }

    /// Live bot and webhook details for the tenant's bot.
    pub async fn status(&self, tenant_id: TenantId) -> Result<Value, OmnichatError> {
        let view = self.vault().load(self.channel_id, tenant_id).await?;
        let client = self.factory.client(&view.credential_ref(ChannelType::Telegram));
        let bot = client.get_me().await?;
        let webhook = client.get_webhook_info().await?;
        Ok(serde_json::json!({
            "success": true,
            "channel_id": self.channel_id,
            "credential_id": view.id,
            "polling": self.polling,
            "bot": bot,
            "webhook": webhook,
        }))
    }

    pub async fn webhook(
        &self,
        credential_id: i64,
        update: &Value,
    ) -> Result<omnichat_ingest::IngestOutcome, OmnichatError> {
        self.handler
            .process_webhook(self.vault(), &self.factory, credential_id, update)
            .await
    }
}
