// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator messages out to the platform.
//!
//! Rows are persisted as `SENT` before any platform call, then moved to
//! `DELIVERED` (with the platform's message id) or `FAILED`. A platform
//! failure never fails the operator action; the caller gets the rows back
//! with their final status.

use std::sync::Arc;
use std::time::Duration;

use omnichat_bus::MessageBus;
use omnichat_core::types::{
    Chat, ChatMessage, CredentialRef, MessageSource, MessageStatus, MessageType,
    NewMessage, OutgoingMessage, SenderType, TenantId,
};
use omnichat_core::{MediaStore, OmnichatError, PlatformClient, PlatformFactory, media};
use omnichat_fanout::Fanout;
use omnichat_storage::models::{MessageUpdate, OperatorDraft, OperatorInsert};
use omnichat_storage::queries::{channels, chats, messages, pictures};
use omnichat_storage::Database;
use omnichat_vault::Vault;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::fetch::MediaFetcher;

/// Window in which an identical operator message counts as a duplicate.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// One operator send. At least one of `text` and `media_url` is required.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub chat_id: i64,
    /// Tenant of the acting operator; the chat must belong to it.
    pub tenant_id: TenantId,
    pub text: Option<String>,
    /// `http(s)://` or `data:` URL of an image.
    pub media_url: Option<String>,
    pub message_type: Option<MessageType>,
    pub source: MessageSource,
    /// Operator user id, forwarded to the bus.
    pub user_id: Option<i64>,
}

impl SendRequest {
    pub fn new(chat_id: i64, tenant_id: TenantId) -> Self {
        Self {
            chat_id,
            tenant_id,
            text: None,
            media_url: None,
            message_type: None,
            source: MessageSource::Api,
            user_id: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn source(mut self, source: MessageSource) -> Self {
        self.source = source;
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// A row to create, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
enum Planned {
    Image { url: String, content: String },
    Text { text: String, message_type: MessageType },
}

impl Planned {
    fn message_type(&self) -> MessageType {
        match self {
            Self::Image { .. } => MessageType::Image,
            Self::Text { message_type, .. } => *message_type,
        }
    }

    fn content(&self) -> &str {
        match self {
            Self::Image { content, .. } => content,
            Self::Text { text, .. } => text,
        }
    }

    /// Repeats are judged on what is sent: the text, or the image source.
    /// An image row's content is a placeholder or a rewritten URL, so it
    /// cannot tell two images apart.
    fn dedup_key(&self) -> String {
        let source = match self {
            Self::Image { url, .. } => url,
            Self::Text { text, .. } => text,
        };
        hex::encode(Sha256::digest(source.as_bytes()))
    }
}

fn plan(request: &SendRequest) -> Result<Vec<Planned>, OmnichatError> {
    let mut text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let mut media_url = request
        .media_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    // An IMAGE message whose only content is a URL.
    if media_url.is_none()
        && request.message_type == Some(MessageType::Image)
        && text
            .as_deref()
            .is_some_and(|t| t.starts_with("data:") || t.starts_with("http://") || t.starts_with("https://"))
    {
        media_url = text.take();
    }

    let mut planned = Vec::new();
    if let Some(url) = media_url {
        let content = if url.starts_with("data:") {
            "[Image]".to_string()
        } else {
            url.clone()
        };
        planned.push(Planned::Image { url, content });
    }
    if let Some(text) = text {
        let message_type = match request.message_type {
            Some(MessageType::Image) | None => MessageType::Text,
            Some(other) => other,
        };
        planned.push(Planned::Text { text, message_type });
    }
    if planned.is_empty() {
        return Err(OmnichatError::Validation(
            "message needs text or an image".into(),
        ));
    }
    Ok(planned)
}

/// Where a chat's messages go.
struct Target {
    credential: CredentialRef,
    client: Arc<dyn PlatformClient>,
}

pub struct OutboundSender {
    db: Database,
    vault: Arc<Vault>,
    platforms: Arc<dyn PlatformFactory>,
    store: Arc<dyn MediaStore>,
    fetcher: MediaFetcher,
    fanout: Arc<Fanout>,
    bus: MessageBus,
    public_base_url: String,
    dedup_window: Duration,
}

impl std::fmt::Debug for OutboundSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSender")
            .field("public_base_url", &self.public_base_url)
            .field("dedup_window", &self.dedup_window)
            .finish_non_exhaustive()
    }
}

impl OutboundSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        vault: Arc<Vault>,
        platforms: Arc<dyn PlatformFactory>,
        store: Arc<dyn MediaStore>,
        fetcher: MediaFetcher,
        fanout: Arc<Fanout>,
        bus: MessageBus,
        public_base_url: &str,
    ) -> Self {
        Self {
            db,
            vault,
            platforms,
            store,
            fetcher,
            fanout,
            bus,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            dedup_window: DEDUP_WINDOW,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Send an operator message. Returns the stored rows in dispatch order.
    pub async fn send(&self, request: SendRequest) -> Result<Vec<ChatMessage>, OmnichatError> {
        let chat = chats::get_chat_for_tenant(&self.db, request.chat_id, request.tenant_id).await?;
        let planned = plan(&request)?;
        let rows = self.store_unless_duplicate(&chat, &planned, request.source).await?;

        let target = self.target(&chat).await;
        let channel_type = match &target {
            Ok(target) => Some(target.credential.channel_type),
            Err(_) => channels::get_channel(&self.db, chat.channel_id)
                .await
                .ok()
                .flatten()
                .map(|c| c.channel_type),
        };

        let mut sent = Vec::with_capacity(rows.len());
        for (item, row) in planned.iter().zip(rows) {
            let update = match &target {
                Ok(target) => match self.deliver(&chat, target, item, &row).await {
                    Ok(update) => update,
                    Err(e) => {
                        warn!(chat_id = chat.id, message_id = row.id, error = %e, "platform send failed");
                        MessageUpdate {
                            status: Some(MessageStatus::Failed),
                            ..MessageUpdate::default()
                        }
                    }
                },
                Err(reason) => {
                    warn!(chat_id = chat.id, message_id = row.id, reason, "no route to platform");
                    MessageUpdate {
                        status: Some(MessageStatus::Failed),
                        ..MessageUpdate::default()
                    }
                }
            };
            let row = messages::update_message(&self.db, row.id, &update).await?;
            info!(
                chat_id = chat.id,
                message_id = row.id,
                status = %row.status,
                external_message_id = ?row.external_message_id,
                "operator message dispatched"
            );
            self.fanout.message(chat.tenant_id, &row);
            self.bus.message(&row, channel_type, request.user_id).await;
            sent.push(row);
        }
        Ok(sent)
    }

    async fn store_unless_duplicate(
        &self,
        chat: &Chat,
        planned: &[Planned],
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, OmnichatError> {
        let since = omnichat_core::time::format(
            chrono::Utc::now()
                - chrono::Duration::from_std(self.dedup_window).unwrap_or_default(),
        );
        let drafts: Vec<OperatorDraft> = planned
            .iter()
            .map(|item| OperatorDraft {
                message: NewMessage {
                    chat_id: chat.id,
                    sender_type: SenderType::Operator,
                    content: item.content().to_string(),
                    message_type: item.message_type(),
                    external_message_id: None,
                    status: MessageStatus::Sent,
                    source,
                    created_at: None,
                },
                dedup_key: item.dedup_key(),
            })
            .collect();

        match messages::create_unless_duplicate(&self.db, &drafts, &since).await? {
            OperatorInsert::Created(rows) => Ok(rows),
            OperatorInsert::Duplicate { index, previous } => {
                let item = &planned[index];
                info!(chat_id = chat.id, previous_id = previous.id, "duplicate operator message rejected");
                self.fanout.duplicate(chat.id, item.content(), item.message_type());
                Err(OmnichatError::DuplicateMessage { chat_id: chat.id })
            }
        }
    }

    async fn target(&self, chat: &Chat) -> Result<Target, String> {
        let channel = channels::get_channel(&self.db, chat.channel_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("channel {} not found", chat.channel_id))?;
        let view = self
            .vault
            .load(channel.id, chat.tenant_id)
            .await
            .map_err(|e| e.to_string())?;
        let credential = view.credential_ref(channel.channel_type);
        let client = self
            .platforms
            .client_for(&credential)
            .map_err(|e| e.to_string())?;
        Ok(Target { credential, client })
    }

    async fn deliver(
        &self,
        chat: &Chat,
        target: &Target,
        item: &Planned,
        row: &ChatMessage,
    ) -> Result<MessageUpdate, OmnichatError> {
        match item {
            Planned::Text { text, .. } => {
                let sent = target
                    .client
                    .send_message(
                        &chat.external_chat_id,
                        &OutgoingMessage {
                            text: Some(text.clone()),
                            image_id: None,
                        },
                    )
                    .await?;
                Ok(MessageUpdate {
                    status: Some(MessageStatus::Delivered),
                    external_message_id: Some(sent.external_message_id),
                    content: None,
                })
            }
            Planned::Image { url, .. } => {
                let fetched = self.fetcher.fetch_image(url).await?;
                debug!(chat_id = chat.id, len = fetched.bytes.len(), content_type = %fetched.content_type, "image fetched");

                let key = self
                    .store
                    .put(&fetched.filename, fetched.bytes.clone(), &fetched.content_type)
                    .await?;
                let public = media::public_url(&self.public_base_url, &key);
                pictures::insert_picture(
                    &self.db,
                    row.id,
                    &public,
                    Some(fetched.bytes.len() as i64),
                    true,
                    target.credential.tenant_id,
                )
                .await?;

                let uploaded = target
                    .client
                    .upload_media(fetched.bytes, &fetched.filename)
                    .await?;
                let sent = target
                    .client
                    .send_message(
                        &chat.external_chat_id,
                        &OutgoingMessage {
                            text: None,
                            image_id: Some(uploaded.media_id),
                        },
                    )
                    .await?;
                Ok(MessageUpdate {
                    status: Some(MessageStatus::Delivered),
                    external_message_id: Some(sent.external_message_id),
                    content: Some(public),
                })
            }
        }
    }
}
