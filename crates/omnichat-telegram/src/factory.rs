// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use omnichat_config::model::{HttpConfig, TelegramConfig};
use omnichat_core::types::{ChannelType, CredentialRef, PlatformProfile};
use omnichat_core::{OmnichatError, PlatformClient, PlatformFactory};
use omnichat_token::{TokenManager, http};
use url::Url;

use crate::TelegramClient;
use crate::client::{bot_profile, unwrap_result};
use crate::media::TelegramMedia;

/// Builds [`TelegramClient`]s sharing one connection pool and media caches.
#[derive(Clone)]
pub struct TelegramFactory {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    tokens: Arc<TokenManager>,
    media: Arc<TelegramMedia>,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for TelegramFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramFactory")
            .field("base_url", &self.base_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl TelegramFactory {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<TokenManager>,
        media: Arc<TelegramMedia>,
    ) -> Result<Self, OmnichatError> {
        Url::parse(base_url)
            .map_err(|e| OmnichatError::Config(format!("invalid telegram.api_base_url: {e}")))?;
        Ok(Self {
            http: http::build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            tokens,
            media,
            webhook_secret: None,
        })
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn from_config(
        telegram: &TelegramConfig,
        http_config: &HttpConfig,
        tokens: Arc<TokenManager>,
        media: Arc<TelegramMedia>,
    ) -> Result<Self, OmnichatError> {
        Ok(Self::new(
            &telegram.api_base_url,
            Duration::from_secs(http_config.timeout_secs),
            tokens,
            media,
        )?
        .with_webhook_secret(telegram.webhook_secret_token.clone()))
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn client(&self, credential: &CredentialRef) -> TelegramClient {
        TelegramClient::new(
            self.http.clone(),
            &self.base_url,
            self.timeout,
            self.tokens.clone(),
            credential.clone(),
            self.media.clone(),
        )
        .with_webhook_secret(self.webhook_secret.clone())
    }

    /// `getMe` with a bot token that is not stored yet.
    pub async fn profile_for_token(&self, bot_token: &str) -> Result<PlatformProfile, OmnichatError> {
        let response = self
            .http
            .post(format!("{}/bot{bot_token}/getMe", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| http::send_error(e.without_url(), self.timeout))?;
        let (status, body) = http::read_body(response, self.timeout).await?;
        bot_profile(&unwrap_result(status, body)?)
    }
}

impl PlatformFactory for TelegramFactory {
    fn client_for(&self, credential: &CredentialRef) -> Result<Arc<dyn PlatformClient>, OmnichatError> {
        if credential.channel_type != ChannelType::Telegram {
            return Err(OmnichatError::Internal(format!(
                "Telegram factory asked for a {} client",
                credential.channel_type
            )));
        }
        Ok(Arc::new(self.client(credential)))
    }
}
