// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use omnichat_config::model::{AvitoConfig, HttpConfig};
use omnichat_core::types::{ChannelType, CredentialRef, PlatformProfile};
use omnichat_core::{OmnichatError, PlatformClient, PlatformFactory};
use omnichat_token::{TokenManager, http};
use url::Url;

use crate::{AvitoClient, convert};

/// Builds [`AvitoClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct AvitoFactory {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    tokens: Arc<TokenManager>,
}

impl std::fmt::Debug for AvitoFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvitoFactory")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl AvitoFactory {
    pub fn new(base_url: &str, timeout: Duration, tokens: Arc<TokenManager>) -> Result<Self, OmnichatError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OmnichatError::Config(format!("invalid avito.api_base_url: {e}")))?;
        Ok(Self {
            http: http::build_client(timeout)?,
            base_url,
            timeout,
            tokens,
        })
    }

    pub fn from_config(
        avito: &AvitoConfig,
        http_config: &HttpConfig,
        tokens: Arc<TokenManager>,
    ) -> Result<Self, OmnichatError> {
        Self::new(
            &avito.api_base_url,
            Duration::from_secs(http_config.timeout_secs),
            tokens,
        )
    }

    /// Concrete client, for callers that need more than the trait.
    pub fn client(&self, credential: &CredentialRef) -> AvitoClient {
        AvitoClient::new(
            self.http.clone(),
            self.base_url.clone(),
            self.timeout,
            self.tokens.clone(),
            credential.clone(),
        )
    }

    /// Account behind a freshly issued token, before any credential exists.
    pub async fn profile_for_token(&self, access_token: &str) -> Result<PlatformProfile, OmnichatError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let response = self
            .http
            .get(format!("{base}/core/v1/accounts/self"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        let raw = http::parse_response(response, self.timeout).await?;
        convert::profile(&raw)
    }
}

impl PlatformFactory for AvitoFactory {
    fn client_for(&self, credential: &CredentialRef) -> Result<Arc<dyn PlatformClient>, OmnichatError> {
        if credential.channel_type != ChannelType::Avito {
            return Err(OmnichatError::Internal(format!(
                "Avito factory asked for a {} client",
                credential.channel_type
            )));
        }
        Ok(Arc::new(self.client(credential)))
    }
}
