// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an OAuth2 `/token/` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::{OmnichatError, TokenEndpoint, TokenGrant, TokenResponse};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::http;

/// Posts form-encoded grants to `{api_base_url}/token/`.
///
/// Grants with an empty `client_id` are filled with the application
/// credentials configured here, so per-tenant credentials that carry no
/// client pair can still be refreshed.
#[derive(Clone)]
pub struct OAuthTokenClient {
    client: reqwest::Client,
    token_url: String,
    timeout: Duration,
    app_client_id: Option<String>,
    app_client_secret: Option<String>,
}

impl std::fmt::Debug for OAuthTokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenClient")
            .field("token_url", &self.token_url)
            .field("app_client_id", &self.app_client_id)
            .finish_non_exhaustive()
    }
}

impl OAuthTokenClient {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, OmnichatError> {
        Ok(Self {
            client: http::build_client(timeout)?,
            token_url: format!("{}/token/", api_base_url.trim_end_matches('/')),
            timeout,
            app_client_id: None,
            app_client_secret: None,
        })
    }

    pub fn with_app_credentials(
        mut self,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.app_client_id = client_id;
        self.app_client_secret = client_secret;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn client_pair<'a>(&'a self, id: &'a str, secret: &'a str) -> (&'a str, &'a str) {
        if id.is_empty() {
            (
                self.app_client_id.as_deref().unwrap_or_default(),
                self.app_client_secret.as_deref().unwrap_or_default(),
            )
        } else {
            (id, secret)
        }
    }

    /// Form body for a grant.
    fn encode(&self, grant: &TokenGrant) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", grant.grant_type());
        match grant {
            TokenGrant::ClientCredentials {
                client_id,
                client_secret,
            } => {
                let (id, secret) = self.client_pair(client_id, client_secret);
                form.append_pair("client_id", id);
                form.append_pair("client_secret", secret);
            }
            TokenGrant::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let (id, secret) = self.client_pair(client_id, client_secret);
                form.append_pair("client_id", id);
                form.append_pair("client_secret", secret);
                form.append_pair("refresh_token", refresh_token);
            }
            TokenGrant::AuthorizationCode {
                client_id,
                client_secret,
                code,
                redirect_uri,
            } => {
                let (id, secret) = self.client_pair(client_id, client_secret);
                form.append_pair("client_id", id);
                form.append_pair("client_secret", secret);
                form.append_pair("code", code);
                if let Some(uri) = redirect_uri {
                    form.append_pair("redirect_uri", uri);
                }
            }
        }
        form.finish()
    }
}

#[async_trait]
impl TokenEndpoint for OAuthTokenClient {
    async fn exchange(&self, grant: TokenGrant) -> Result<TokenResponse, OmnichatError> {
        debug!(grant_type = grant.grant_type(), url = %self.token_url, "requesting token");
        let response = self
            .client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.encode(&grant))
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;

        let (status, body) = http::read_body(response, self.timeout).await?;
        if !status.is_success() {
            let message = body.message();
            warn!(
                status = status.as_u16(),
                grant_type = grant.grant_type(),
                %message,
                "token endpoint rejected grant"
            );
            return Err(OmnichatError::Platform {
                status: status.as_u16(),
                message,
            });
        }

        let value = body.into_value();
        // Some endpoints answer 200 with an OAuth error document.
        if value.get("access_token").is_none() {
            let message = value
                .get("error_description")
                .or_else(|| value.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("token response carries no access_token")
                .to_string();
            warn!(grant_type = grant.grant_type(), %message, "token endpoint returned no token");
            return Err(OmnichatError::Platform {
                status: 400,
                message,
            });
        }
        serde_json::from_value(value).map_err(|e| OmnichatError::Http {
            message: format!("failed to parse token response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}
