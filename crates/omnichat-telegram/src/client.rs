// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Telegram Bot API.
//!
//! Methods are called as `POST {base}/bot{token}/{method}`; files are
//! fetched from `{base}/file/bot{token}/{file_path}`. Responses carry
//! `{ok, result}` or `{ok: false, error_code, description}`.
//!
//! The bot token is part of every URL, so transport errors are stripped of
//! their URL before they are logged or returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::event::{MessageEvent, id_string};
use omnichat_core::traits::platform::MAX_MEDIA_BYTES;
use omnichat_core::types::{
    ChannelType, ChatListQuery, CredentialRef, OutgoingMessage, PlatformProfile, RemoteChat,
    RemoteUser, SentMessage, UploadedMedia,
};
use omnichat_core::{AdapterType, HealthStatus, OmnichatError, PlatformClient, PluginAdapter};
use omnichat_token::{TokenManager, http};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::convert;
use crate::media::{PendingUpload, TelegramMedia};

/// Update kinds requested from `getUpdates` and `setWebhook`.
pub const ALLOWED_UPDATES: [&str; 3] = ["message", "edited_message", "callback_query"];

enum Request {
    Json(Value),
    Upload {
        field: &'static str,
        params: Vec<(&'static str, String)>,
        upload: PendingUpload,
    },
}

/// Telegram client bound to one bot credential.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    tokens: Arc<TokenManager>,
    credential: CredentialRef,
    media: Arc<TelegramMedia>,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("credential_id", &self.credential.credential_id)
            .field("bot", &self.credential.external_account_id)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        timeout: Duration,
        tokens: Arc<TokenManager>,
        credential: CredentialRef,
        media: Arc<TelegramMedia>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            tokens,
            credential,
            media,
            webhook_secret: None,
        }
    }

    /// Secret echoed by Telegram in `X-Telegram-Bot-Api-Secret-Token`.
    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    async fn call(&self, method: &'static str, body: Value) -> Result<Value, OmnichatError> {
        self.call_with(method, Request::Json(body), self.timeout).await
    }

    async fn call_with(
        &self,
        method: &'static str,
        request: Request,
        timeout: Duration,
    ) -> Result<Value, OmnichatError> {
        debug!(method, credential_id = self.credential.credential_id, "telegram request");
        self.tokens
            .with_access_token(self.credential.credential_id, |token| {
                let url = format!("{}/bot{token}/{method}", self.base_url);
                let builder = self.http.post(url).timeout(timeout);
                let builder = match &request {
                    Request::Json(body) => Ok(builder.json(body)),
                    Request::Upload {
                        field,
                        params,
                        upload,
                    } => Part::bytes(upload.bytes.as_ref().clone())
                        .file_name(upload.filename.clone())
                        .mime_str(&upload.content_type)
                        .map(|part| {
                            let form = params
                                .iter()
                                .fold(Form::new(), |form, (k, v)| form.text(*k, v.clone()));
                            builder.multipart(form.part(*field, part))
                        })
                        .map_err(|e| OmnichatError::Validation(format!("bad content type: {e}"))),
                };
                async move {
                    let response = builder?
                        .send()
                        .await
                        .map_err(|e| http::send_error(e.without_url(), timeout))?;
                    let (status, body) = http::read_body(response, timeout).await?;
                    unwrap_result(status, body)
                }
            })
            .await
    }

    pub async fn get_me(&self) -> Result<Value, OmnichatError> {
        self.call("getMe", json!({})).await
    }

    /// `file_path` for a file id, when Telegram still has the file.
    pub async fn get_file(&self, file_id: &str) -> Result<Option<String>, OmnichatError> {
        let file = self.call("getFile", json!({ "file_id": file_id })).await?;
        Ok(file
            .get("file_path")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Download a file by the path `getFile` returned.
    pub async fn download(&self, file_path: &str) -> Result<Vec<u8>, OmnichatError> {
        let timeout = self.timeout;
        let path = file_path.trim_start_matches('/').to_string();
        self.tokens
            .with_access_token(self.credential.credential_id, |token| {
                let request = self
                    .http
                    .get(format!("{}/file/bot{token}/{path}", self.base_url));
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| http::send_error(e.without_url(), timeout))?;
                    let status = response.status();
                    if !status.is_success() {
                        let (status, body) = http::read_body(response, timeout).await?;
                        return Err(OmnichatError::Platform {
                            status: status.as_u16(),
                            message: body.message(),
                        });
                    }
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| http::send_error(e.without_url(), timeout))?;
                    if bytes.len() > MAX_MEDIA_BYTES {
                        return Err(OmnichatError::Validation(format!(
                            "telegram file is {} bytes, limit is {MAX_MEDIA_BYTES}",
                            bytes.len()
                        )));
                    }
                    Ok(bytes.to_vec())
                }
            })
            .await
    }

    pub async fn get_user_profile_photos(&self, user_id: &str) -> Result<Value, OmnichatError> {
        self.call(
            "getUserProfilePhotos",
            json!({ "user_id": user_id, "limit": 1 }),
        )
        .await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), OmnichatError> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_query_id, "text": text }),
        )
        .await
        .map(|_| ())
    }

    /// Long-poll for updates. The request timeout is widened by the poll
    /// timeout so Telegram answers before the client gives up.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout_secs: u64,
        limit: u32,
    ) -> Result<Vec<Value>, OmnichatError> {
        let mut body = json!({
            "timeout": poll_timeout_secs,
            "limit": limit,
            "allowed_updates": ALLOWED_UPDATES,
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let timeout = self.timeout + Duration::from_secs(poll_timeout_secs);
        let result = self
            .call_with("getUpdates", Request::Json(body), timeout)
            .await?;
        Ok(match result {
            Value::Array(updates) => updates,
            _ => Vec::new(),
        })
    }

    pub async fn delete_webhook(&self) -> Result<(), OmnichatError> {
        self.call("deleteWebhook", json!({})).await.map(|_| ())
    }

    pub async fn get_webhook_info(&self) -> Result<Value, OmnichatError> {
        self.call("getWebhookInfo", json!({})).await
    }

    /// Fetch a Telegram file into the object store and return its public
    /// URL. `None` when Telegram no longer serves the file.
    pub async fn mirror_file(&self, file_id: &str) -> Result<Option<String>, OmnichatError> {
        let Some(file_path) = self.get_file(file_id).await? else {
            return Ok(None);
        };
        let bytes = self.download(&file_path).await?;
        let content_type = omnichat_core::media::infer_content_type(None, &bytes);
        let basename = file_path.rsplit('/').next().unwrap_or(file_id);
        let filename = if basename.contains('.') {
            basename.to_string()
        } else {
            format!(
                "{basename}.{}",
                omnichat_core::media::infer_extension(Some(&content_type), &bytes)
            )
        };
        self.media
            .publish(&filename, bytes, &content_type)
            .await
            .map(Some)
    }

    /// Public URL of a user's current profile photo, cached per user.
    ///
    /// Failures are logged and reported as `None`; a missing avatar never
    /// blocks message handling.
    pub async fn avatar_url(&self, user_id: &str) -> Option<String> {
        if let Some(url) = self.media.cached_avatar(user_id).await {
            return Some(url);
        }
        let photos = match self.get_user_profile_photos(user_id).await {
            Ok(photos) => photos,
            Err(e) => {
                debug!(user_id, error = %e, "profile photos unavailable");
                return None;
            }
        };
        let sizes = photos
            .get("photos")
            .and_then(Value::as_array)
            .and_then(|p| p.first())
            .and_then(Value::as_array)?;
        let file_id = convert::largest_size(sizes)?
            .get("file_id")
            .and_then(id_string)?;
        match self.mirror_file(&file_id).await {
            Ok(Some(url)) => {
                self.media.remember_avatar(user_id, &url).await;
                Some(url)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id, error = %e, "failed to mirror avatar");
                None
            }
        }
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<Value, OmnichatError> {
        let Some(upload) = self.media.take_staged(media_id).await else {
            // A Telegram file id or a public URL.
            let mut body = json!({ "chat_id": chat_id, "photo": media_id });
            if let Some(caption) = caption {
                body["caption"] = json!(caption);
            }
            return self.call("sendPhoto", body).await;
        };
        let (method, field) = if omnichat_core::media::is_image(&upload.content_type) {
            ("sendPhoto", "photo")
        } else if upload.content_type.starts_with("video/") {
            ("sendVideo", "video")
        } else {
            ("sendDocument", "document")
        };
        let mut params = vec![("chat_id", chat_id.to_string())];
        if let Some(caption) = caption {
            params.push(("caption", caption.to_string()));
        }
        self.call_with(
            method,
            Request::Upload {
                field,
                params,
                upload,
            },
            self.timeout,
        )
        .await
    }
}

/// Check transport status, then the `ok` flag, and return `result`.
pub(crate) fn unwrap_result(status: StatusCode, body: http::Body) -> Result<Value, OmnichatError> {
    let value = http::check_status(status, body)?;
    if value.get("ok").and_then(Value::as_bool) == Some(false) {
        let status = value
            .get("error_code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(400);
        let message = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("telegram request failed")
            .to_string();
        return Err(OmnichatError::Platform { status, message });
    }
    Ok(value.get("result").cloned().unwrap_or(Value::Null))
}

/// Profile of the bot described by a `getMe` result.
pub(crate) fn bot_profile(me: &Value) -> Result<PlatformProfile, OmnichatError> {
    let external_account_id = me.get("id").and_then(id_string).ok_or_else(|| {
        OmnichatError::Platform {
            status: 502,
            message: "getMe returned no id".into(),
        }
    })?;
    let display_name = me
        .get("username")
        .or_else(|| me.get("first_name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(PlatformProfile {
        external_account_id,
        display_name,
        avatar: None,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl PluginAdapter for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        match self.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    /// The bot API has no chat listing; history arrives only as updates.
    async fn list_chats(&self, _query: &ChatListQuery) -> Result<Vec<RemoteChat>, OmnichatError> {
        debug!("telegram has no chat listing");
        Ok(Vec::new())
    }

    async fn list_messages(
        &self,
        _chat_id: &str,
        _limit: u32,
        _offset: u32,
    ) -> Result<Vec<MessageEvent>, OmnichatError> {
        Ok(Vec::new())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, OmnichatError> {
        let text = non_empty(&message.text);
        let result = match (non_empty(&message.image_id), text) {
            (None, None) => {
                return Err(OmnichatError::Validation(
                    "message needs text or an image".into(),
                ));
            }
            (Some(media_id), caption) => self.send_media(chat_id, media_id, caption).await?,
            (None, Some(text)) => {
                self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
                    .await?
            }
        };
        let external_message_id = result
            .get("message_id")
            .and_then(id_string)
            .ok_or_else(|| OmnichatError::Platform {
                status: 502,
                message: "telegram send returned no message_id".into(),
            })?;
        Ok(SentMessage {
            external_message_id,
        })
    }

    /// Telegram has no standalone upload; bytes are staged and sent as
    /// multipart with the next `send_message` naming the returned id.
    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedMedia, OmnichatError> {
        if bytes.is_empty() {
            return Err(OmnichatError::Validation("empty upload".into()));
        }
        if bytes.len() > MAX_MEDIA_BYTES {
            return Err(OmnichatError::Validation(format!(
                "upload is {} bytes, limit is {MAX_MEDIA_BYTES}",
                bytes.len()
            )));
        }
        let content_type = omnichat_core::media::infer_content_type(None, &bytes);
        let media_id = self
            .media
            .stage(PendingUpload {
                bytes: Arc::new(bytes),
                filename: filename.to_string(),
                content_type,
            })
            .await;
        Ok(UploadedMedia {
            media_id,
            url: None,
        })
    }

    async fn get_media_url(&self, media_id: &str) -> Result<Option<String>, OmnichatError> {
        self.mirror_file(media_id).await
    }

    /// Bots cannot mark messages read.
    async fn mark_read(&self, _chat_id: &str) -> Result<bool, OmnichatError> {
        Ok(true)
    }

    async fn get_self(&self) -> Result<PlatformProfile, OmnichatError> {
        bot_profile(&self.get_me().await?)
    }

    async fn register_webhook(&self, url: &str) -> Result<Value, OmnichatError> {
        let mut body = json!({ "url": url, "allowed_updates": ALLOWED_UPDATES });
        if let Some(secret) = &self.webhook_secret {
            body["secret_token"] = json!(secret);
        }
        self.call("setWebhook", body).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<RemoteChat>, OmnichatError> {
        let chat = match self.call("getChat", json!({ "chat_id": chat_id })).await {
            Ok(chat) => chat,
            Err(OmnichatError::Platform { status: 400, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let id = chat
            .get("id")
            .and_then(id_string)
            .unwrap_or_else(|| chat_id.to_string());
        let name = convert::contact_name(&chat).or_else(|| {
            chat.get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(Some(RemoteChat {
            users: vec![RemoteUser {
                id: id.clone(),
                name,
                phone: None,
                avatar: None,
            }],
            id,
            ..RemoteChat::default()
        }))
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<bool, OmnichatError> {
        match self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await
        {
            Ok(result) => Ok(result.as_bool().unwrap_or(false)),
            Err(OmnichatError::Platform { status, message }) if status == 400 => {
                warn!(chat_id, message_id, %message, "telegram refused to delete message");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Private chats cannot be closed by a bot.
    async fn close_chat(&self, chat_id: &str) -> Result<bool, OmnichatError> {
        debug!(chat_id, "telegram chats cannot be closed remotely");
        Ok(false)
    }
}
