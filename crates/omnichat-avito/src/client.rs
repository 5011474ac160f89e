// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Avito messenger API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::event::MessageEvent;
use omnichat_core::types::{
    ChannelType, ChatListQuery, CredentialRef, OutgoingMessage, PlatformProfile, RemoteChat,
    SentMessage, UploadedMedia,
};
use omnichat_core::traits::platform::MAX_MEDIA_BYTES;
use omnichat_core::{AdapterType, HealthStatus, OmnichatError, PlatformClient, PluginAdapter};
use omnichat_token::{TokenManager, http};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::convert;

/// Largest page the messenger accepts.
pub const MAX_PAGE: u32 = 100;

/// Message deletion endpoints, tried in order. 404/405 means "not this
/// variant"; any other failure is remembered and the next variant is tried.
const DELETE_STRATEGIES: [(DeleteMethod, &str); 3] = [
    (DeleteMethod::Post, ""),
    (DeleteMethod::Post, "/delete"),
    (DeleteMethod::Delete, ""),
];

#[derive(Debug, Clone, Copy)]
enum DeleteMethod {
    Post,
    Delete,
}

impl DeleteMethod {
    fn method(self) -> Method {
        match self {
            Self::Post => Method::POST,
            Self::Delete => Method::DELETE,
        }
    }
}

enum Payload {
    Empty,
    Json(Value),
    Image {
        bytes: Vec<u8>,
        filename: String,
        content_type: String,
    },
}

/// Avito client bound to one credential.
#[derive(Clone)]
pub struct AvitoClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    tokens: Arc<TokenManager>,
    credential: CredentialRef,
}

impl std::fmt::Debug for AvitoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvitoClient")
            .field("base_url", &self.base_url.as_str())
            .field("credential_id", &self.credential.credential_id)
            .field("account", &self.credential.external_account_id)
            .finish_non_exhaustive()
    }
}

impl AvitoClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        timeout: Duration,
        tokens: Arc<TokenManager>,
        credential: CredentialRef,
    ) -> Self {
        Self {
            http,
            base_url,
            timeout,
            tokens,
            credential,
        }
    }

    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    /// `{base}/{path}` with path segments appended verbatim.
    fn url(&self, path: &str) -> Result<Url, OmnichatError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))
            .map_err(|e| OmnichatError::Config(format!("invalid Avito URL for {path}: {e}")))
    }

    fn account_path(&self, version: &str, rest: &str) -> String {
        format!(
            "messenger/{version}/accounts/{}/{rest}",
            self.credential.external_account_id
        )
    }

    fn require_account(&self) -> Result<(), OmnichatError> {
        if self.credential.external_account_id.is_empty() {
            return Err(OmnichatError::Validation(
                "Avito credential has no account id".into(),
            ));
        }
        Ok(())
    }

    /// Authorized request with the token manager's refresh-and-retry.
    async fn call(&self, method: Method, url: Url, payload: Payload) -> Result<Value, OmnichatError> {
        let timeout = self.timeout;
        debug!(%method, %url, credential_id = self.credential.credential_id, "avito request");
        self.tokens
            .with_access_token(self.credential.credential_id, |token| {
                let request = self
                    .http
                    .request(method.clone(), url.clone())
                    .bearer_auth(token);
                let request = match &payload {
                    Payload::Empty => Ok(request),
                    Payload::Json(body) => Ok(request.json(body)),
                    Payload::Image {
                        bytes,
                        filename,
                        content_type,
                    } => Part::bytes(bytes.clone())
                        .file_name(filename.clone())
                        .mime_str(content_type)
                        .map(|part| request.multipart(Form::new().part("uploadfile[]", part)))
                        .map_err(|e| OmnichatError::Validation(format!("bad content type: {e}"))),
                };
                async move {
                    let response = request?
                        .send()
                        .await
                        .map_err(|e| http::send_error(e, timeout))?;
                    http::parse_response(response, timeout).await
                }
            })
            .await
    }

    async fn get(&self, url: Url) -> Result<Value, OmnichatError> {
        self.call(Method::GET, url, Payload::Empty).await
    }

    async fn post(&self, url: Url, body: Value) -> Result<Value, OmnichatError> {
        self.call(Method::POST, url, Payload::Json(body)).await
    }
}

#[async_trait]
impl PluginAdapter for AvitoClient {
    fn name(&self) -> &str {
        "avito"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        match self.tokens.access_token(self.credential.credential_id).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }
}

#[async_trait]
impl PlatformClient for AvitoClient {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Avito
    }

    async fn list_chats(&self, query: &ChatListQuery) -> Result<Vec<RemoteChat>, OmnichatError> {
        self.require_account()?;
        let mut url = self.url(&self.account_path("v2", "chats"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.clamp(1, MAX_PAGE).to_string());
            pairs.append_pair("offset", &query.offset.to_string());
            if !query.chat_types.is_empty() {
                pairs.append_pair("chat_types", &query.chat_types.join(","));
            }
            if query.unread_only {
                pairs.append_pair("unread_only", "true");
            }
        }
        let response = self.get(url).await?;
        Ok(convert::list_of(&response, "chats")
            .iter()
            .filter_map(|raw| match convert::remote_chat(raw) {
                Ok(chat) => Some(chat),
                Err(e) => {
                    warn!(error = %e, "skipping malformed chat in listing");
                    None
                }
            })
            .collect())
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageEvent>, OmnichatError> {
        self.require_account()?;
        let mut url = self.url(&self.account_path("v3", &format!("chats/{chat_id}/messages/")))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.clamp(1, MAX_PAGE).to_string())
            .append_pair("offset", &offset.to_string());
        let response = self.get(url).await?;
        Ok(convert::list_of(&response, "messages")
            .iter()
            .filter_map(|raw| match omnichat_core::event::message_from_listing(chat_id, raw) {
                Ok(mut event) => {
                    if event.user_id.is_none() {
                        event.user_id = Some(self.credential.external_account_id.clone());
                    }
                    Some(event)
                }
                Err(e) => {
                    warn!(%chat_id, error = %e, "skipping malformed message in listing");
                    None
                }
            })
            .collect())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, OmnichatError> {
        self.require_account()?;
        let response = match (&message.image_id, &message.text) {
            (Some(image_id), _) => {
                let url = self.url(&self.account_path("v1", &format!("chats/{chat_id}/messages/image")))?;
                self.post(url, json!({ "image_id": image_id })).await?
            }
            (None, Some(text)) if !text.is_empty() => {
                let url = self.url(&self.account_path("v1", &format!("chats/{chat_id}/messages")))?;
                self.post(url, json!({ "message": { "text": text }, "type": "text" }))
                    .await?
            }
            _ => {
                return Err(OmnichatError::Validation(
                    "message needs text or an image".into(),
                ));
            }
        };
        let external_message_id = response
            .get("id")
            .and_then(omnichat_core::event::id_string)
            .ok_or_else(|| OmnichatError::Platform {
                status: 200,
                message: "send response carries no message id".into(),
            })?;
        Ok(SentMessage {
            external_message_id,
        })
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedMedia, OmnichatError> {
        self.require_account()?;
        if bytes.len() > MAX_MEDIA_BYTES {
            return Err(OmnichatError::Validation(format!(
                "media is {} bytes, limit is {MAX_MEDIA_BYTES}",
                bytes.len()
            )));
        }
        let content_type = omnichat_core::media::infer_content_type(None, &bytes);
        let url = self.url(&format!(
            "messenger/v1/accounts/{}/uploadImages",
            self.credential.external_account_id
        ))?;
        let response = self
            .call(
                Method::POST,
                url,
                Payload::Image {
                    bytes,
                    filename: filename.to_string(),
                    content_type,
                },
            )
            .await?;
        convert::uploaded_image(&response)
    }

    async fn get_media_url(&self, media_id: &str) -> Result<Option<String>, OmnichatError> {
        self.require_account()?;
        let mut url = self.url(&self.account_path("v1", "getVoiceFiles"))?;
        url.query_pairs_mut().append_pair("voice_ids", media_id);
        let response = self.get(url).await?;
        Ok(convert::voice_url(&response, media_id))
    }

    async fn mark_read(&self, chat_id: &str) -> Result<bool, OmnichatError> {
        self.require_account()?;
        let url = self.url(&self.account_path("v1", &format!("chats/{chat_id}/read")))?;
        let response = self.post(url, json!({})).await?;
        Ok(response.get("ok").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn get_self(&self) -> Result<PlatformProfile, OmnichatError> {
        let url = self.url("core/v1/accounts/self")?;
        let response = self.get(url).await?;
        convert::profile(&response)
    }

    async fn register_webhook(&self, url: &str) -> Result<Value, OmnichatError> {
        let endpoint = self.url("messenger/v3/webhook")?;
        self.post(endpoint, json!({ "url": url })).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<RemoteChat>, OmnichatError> {
        self.require_account()?;
        let url = self.url(&self.account_path("v2", &format!("chats/{chat_id}")))?;
        match self.get(url).await {
            Ok(raw) => {
                let doc = raw.get("chat").unwrap_or(&raw);
                convert::remote_chat(doc).map(Some)
            }
            Err(OmnichatError::Platform { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<bool, OmnichatError> {
        self.require_account()?;
        for (method, suffix) in DELETE_STRATEGIES {
            let url = self.url(&self.account_path(
                "v1",
                &format!("chats/{chat_id}/messages/{message_id}{suffix}"),
            ))?;
            let payload = match method {
                DeleteMethod::Post => Payload::Json(json!({})),
                DeleteMethod::Delete => Payload::Empty,
            };
            match self.call(method.method(), url, payload).await {
                Ok(_) => {
                    debug!(%chat_id, %message_id, ?method, suffix, "message deleted");
                    return Ok(true);
                }
                Err(OmnichatError::Platform { status: 404 | 405, .. }) => continue,
                Err(e) => {
                    warn!(%chat_id, %message_id, ?method, suffix, error = %e, "delete variant failed");
                }
            }
        }
        Ok(false)
    }

    async fn close_chat(&self, chat_id: &str) -> Result<bool, OmnichatError> {
        self.require_account()?;
        let url = self.url(&self.account_path("v1", &format!("chats/{chat_id}/close")))?;
        match self.post(url, json!({})).await {
            Ok(_) => Ok(true),
            Err(OmnichatError::Platform { status, message }) => {
                warn!(%chat_id, status, %message, "platform refused to close chat");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
