// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event router: canonical events in, persisted rows and broadcasts out.
//!
//! Every inbound path (webhooks, Telegram updates, history sync) funnels
//! through [`EventRouter`], so idempotency, contact extraction and
//! attachment handling behave the same regardless of where an event came
//! from.

use std::sync::Arc;

use omnichat_bus::{MessageBus, NewChatPublished, TypingPublished};
use omnichat_core::event::{MessageBody, MessageEvent, PlatformEvent, StatusEvent, TypingEvent};
use omnichat_core::types::{
    Chat, ChatMessage, CredentialRef, MessageSource, MessageStatus, NewChat, NewMessage,
    RemoteChat, SenderType,
};
use omnichat_core::{OmnichatError, PlatformClient};
use omnichat_fanout::{Fanout, TypingView};
use omnichat_storage::Database;
use omnichat_storage::queries::{chats, contacts, messages, pictures};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::content;
use crate::phone;

/// Credential-level context for one event.
#[derive(Clone, Copy)]
pub struct RouteContext<'a> {
    pub credential: &'a CredentialRef,
    /// Used to resolve media handles and harvest participant details.
    pub client: Option<&'a dyn PlatformClient>,
    pub source: MessageSource,
}

impl<'a> RouteContext<'a> {
    pub fn new(credential: &'a CredentialRef, client: Option<&'a dyn PlatformClient>) -> Self {
        Self {
            credential,
            client,
            source: MessageSource::Webhook,
        }
    }

    pub fn with_source(mut self, source: MessageSource) -> Self {
        self.source = source;
        self
    }
}

/// Chat row hints gathered from an event or a chat listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatHints {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub metadata: Map<String, Value>,
}

impl ChatHints {
    /// Hints from a platform chat listing: the first participant that is not
    /// the connected account, plus listing context.
    pub fn from_remote(chat: &RemoteChat, account_id: &str) -> Self {
        let counterpart = chat
            .users
            .iter()
            .find(|u| !account_id.is_empty() && u.id != account_id);
        let mut metadata = chat.context.to_metadata();
        if let Some(user) = counterpart {
            metadata.insert("user_id".into(), Value::String(user.id.clone()));
        }
        Self {
            name: counterpart.and_then(|u| u.name.clone()),
            phone: counterpart
                .and_then(|u| u.phone.as_deref())
                .and_then(phone::normalize_phone),
            avatar: counterpart.and_then(|u| u.avatar.clone()),
            metadata,
        }
    }

    /// Keep existing values, fill the gaps from `other`.
    pub fn or(mut self, other: ChatHints) -> Self {
        self.name = self.name.or(other.name);
        self.phone = self.phone.or(other.phone);
        self.avatar = self.avatar.or(other.avatar);
        for (key, value) in other.metadata {
            self.metadata.entry(key).or_insert(value);
        }
        self
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRouted {
    pub chat: Chat,
    pub message: ChatMessage,
    /// `false` when the external id was already stored.
    pub created: bool,
    pub chat_created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Message(MessageRouted),
    Status {
        chat_id: i64,
        message_id: i64,
        status: MessageStatus,
    },
    Typing {
        chat_id: i64,
    },
    Ignored {
        reason: String,
    },
}

pub struct EventRouter {
    db: Database,
    fanout: Arc<Fanout>,
    bus: MessageBus,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("db", &self.db.path())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    pub fn new(db: Database, fanout: Arc<Fanout>, bus: MessageBus) -> Self {
        Self { db, fanout, bus }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Route any canonical event.
    pub async fn route(
        &self,
        ctx: RouteContext<'_>,
        event: PlatformEvent,
    ) -> Result<RouteOutcome, OmnichatError> {
        match event {
            PlatformEvent::Message(message) => self
                .route_message(ctx, &message, ChatHints::default())
                .await
                .map(RouteOutcome::Message),
            PlatformEvent::Status(status) => self.route_status(ctx, &status).await,
            PlatformEvent::Typing(typing) => self.route_typing(ctx, &typing).await,
            PlatformEvent::Unknown { kind } => {
                info!(kind, credential_id = ctx.credential.credential_id, "unknown event type ignored");
                Ok(RouteOutcome::Ignored {
                    reason: format!("unknown event type {kind}"),
                })
            }
        }
    }

    /// Sender direction relative to the connected account.
    pub fn direction(&self, ctx: RouteContext<'_>, event: &MessageEvent) -> SenderType {
        if matches!(event.body, MessageBody::System { .. }) && event.author_id.as_deref() == Some("0")
        {
            return SenderType::System;
        }
        let account = ctx.credential.external_account_id.as_str();
        if account.is_empty() {
            warn!(
                credential_id = ctx.credential.credential_id,
                chat = %event.chat_id,
                "credential has no account id, treating message as client"
            );
            return SenderType::Client;
        }
        match event.author_id.as_deref() {
            Some(author) if author == account => SenderType::Operator,
            _ => SenderType::Client,
        }
    }

    /// Persist a message event, creating its chat when needed.
    pub async fn route_message(
        &self,
        ctx: RouteContext<'_>,
        event: &MessageEvent,
        hints: ChatHints,
    ) -> Result<MessageRouted, OmnichatError> {
        let credential = ctx.credential;
        if !event.id.is_empty()
            && let Some(chat) = chats::get_chat_by_external(
                &self.db,
                credential.channel_id,
                credential.tenant_id,
                &event.chat_id,
            )
            .await?
            && let Some(existing) =
                messages::get_message_by_external(&self.db, chat.id, &event.id).await?
        {
            debug!(chat_id = chat.id, external_message_id = %event.id, "message already stored");
            return Ok(MessageRouted {
                chat,
                message: existing,
                created: false,
                chat_created: false,
            });
        }

        let sender = self.direction(ctx, event);
        let hints = hints.or(event_hints(event, sender));
        let upsert = self.resolve_chat(ctx, &event.chat_id, hints).await?;
        self.ingest_message(ctx, upsert.chat, upsert.created, event)
            .await
    }

    /// Find or create the chat row for an external chat id.
    ///
    /// Publishes `chat.events.new_chat` when the row is new.
    pub async fn resolve_chat(
        &self,
        ctx: RouteContext<'_>,
        external_chat_id: &str,
        hints: ChatHints,
    ) -> Result<omnichat_storage::ChatUpsert, OmnichatError> {
        if external_chat_id.trim().is_empty() {
            return Err(OmnichatError::Validation("event has no chat id".into()));
        }
        let credential = ctx.credential;
        let upsert = chats::get_or_create_chat(
            &self.db,
            &NewChat {
                channel_id: credential.channel_id,
                tenant_id: credential.tenant_id,
                external_chat_id: external_chat_id.to_string(),
                name: hints.name,
                phone: hints.phone,
                avatar: hints.avatar,
                metadata: hints.metadata,
            },
        )
        .await?;
        if upsert.created {
            info!(
                chat_id = upsert.chat.id,
                tenant_id = credential.tenant_id,
                external_chat_id,
                "chat created"
            );
            self.bus
                .new_chat(&NewChatPublished {
                    chat_id: upsert.chat.id,
                    tenant_id: credential.tenant_id,
                    channel_id: credential.channel_id,
                    timestamp: omnichat_core::time::now(),
                })
                .await;
        }
        Ok(upsert)
    }

    /// Persist one message into an already resolved chat.
    pub async fn ingest_message(
        &self,
        ctx: RouteContext<'_>,
        mut chat: Chat,
        chat_created: bool,
        event: &MessageEvent,
    ) -> Result<MessageRouted, OmnichatError> {
        let credential = ctx.credential;
        let sender = self.direction(ctx, event);

        let url = match content::shipped_url(&event.body) {
            Some(url) => Some(url.to_string()),
            None => self.resolve_media(ctx, &event.body).await,
        };
        let rendered = content::render(&event.body, event.caption.as_deref(), url.as_deref());

        let external_message_id = Some(event.id.clone()).filter(|id| !id.is_empty());
        let inserted = messages::create_message_and_update_chat(
            &self.db,
            &NewMessage {
                chat_id: chat.id,
                sender_type: sender,
                content: rendered.content,
                message_type: rendered.message_type,
                external_message_id,
                status: MessageStatus::Delivered,
                source: ctx.source,
                created_at: omnichat_core::time::from_unix(event.created).filter(|_| event.created > 0),
            },
        )
        .await?;
        if !inserted.created {
            return Ok(MessageRouted {
                chat,
                message: inserted.message,
                created: false,
                chat_created,
            });
        }
        let message = inserted.message;

        for (index, attachment) in rendered.attachments.iter().enumerate() {
            pictures::insert_picture(
                &self.db,
                message.id,
                &attachment.url,
                attachment.size,
                index == 0,
                credential.tenant_id,
            )
            .await?;
        }

        if sender == SenderType::Client {
            chat = self.collect_contact(ctx, chat, chat_created, event).await;
        }

        debug!(
            chat_id = chat.id,
            message_id = message.id,
            external_message_id = ?message.external_message_id,
            sender_type = %sender,
            "message stored"
        );
        self.publish(credential, &message).await;

        Ok(MessageRouted {
            chat,
            message,
            created: true,
            chat_created,
        })
    }

    /// Realtime and bus delivery for a stored message.
    pub async fn publish(&self, credential: &CredentialRef, message: &ChatMessage) {
        self.fanout.message(credential.tenant_id, message);
        self.bus
            .message(message, Some(credential.channel_type), None)
            .await;
    }

    async fn resolve_media(&self, ctx: RouteContext<'_>, body: &MessageBody) -> Option<String> {
        let handle = content::media_handle(body)?;
        let client = ctx.client?;
        match client.get_media_url(handle).await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    credential_id = ctx.credential.credential_id,
                    media = handle,
                    error = %e,
                    "media url lookup failed"
                );
                None
            }
        }
    }

    /// Link the sender as a contact and fill empty chat fields.
    ///
    /// Best-effort: failures are logged and the chat is returned as is.
    async fn collect_contact(
        &self,
        ctx: RouteContext<'_>,
        chat: Chat,
        chat_created: bool,
        event: &MessageEvent,
    ) -> Chat {
        let credential = ctx.credential;
        let mut hints = event_hints(event, SenderType::Client);

        if chat.phone.is_none()
            && hints.phone.is_none()
            && chat_created
            && let Some(client) = ctx.client
        {
            match client.get_chat(&chat.external_chat_id).await {
                Ok(Some(remote)) => {
                    hints = hints.or(ChatHints::from_remote(
                        &remote,
                        &credential.external_account_id,
                    ));
                }
                Ok(None) => {}
                Err(e) => debug!(chat_id = chat.id, error = %e, "participant lookup failed"),
            }
        }

        let needs_fill = (chat.name.is_none() && hints.name.is_some())
            || (chat.phone.is_none() && hints.phone.is_some())
            || (chat.avatar.is_none() && hints.avatar.is_some())
            || hints
                .metadata
                .keys()
                .any(|k| chat.metadata.get(k).is_none());
        let mut chat = if needs_fill {
            match chats::get_or_create_chat(
                &self.db,
                &NewChat {
                    channel_id: chat.channel_id,
                    tenant_id: chat.tenant_id,
                    external_chat_id: chat.external_chat_id.clone(),
                    name: hints.name.clone(),
                    phone: hints.phone.clone(),
                    avatar: hints.avatar.clone(),
                    metadata: hints.metadata.clone(),
                },
            )
            .await
            {
                Ok(upsert) => upsert.chat,
                Err(e) => {
                    warn!(chat_id = chat.id, error = %e, "failed to update chat hints");
                    chat
                }
            }
        } else {
            chat
        };

        let Some(author_id) = event.author_id.as_deref().filter(|id| !id.is_empty()) else {
            return chat;
        };
        match contacts::upsert_contact_by_external(
            &self.db,
            chat.channel_id,
            author_id,
            hints.name,
            hints.phone,
            hints.avatar,
        )
        .await
        {
            Ok(contact) if chat.contact_id.is_none() => {
                match chats::set_chat_contact(&self.db, chat.id, contact.id).await {
                    Ok(updated) => chat = updated,
                    Err(e) => warn!(chat_id = chat.id, error = %e, "failed to link contact"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(chat_id = chat.id, error = %e, "failed to upsert contact"),
        }
        chat
    }

    async fn route_status(
        &self,
        ctx: RouteContext<'_>,
        event: &StatusEvent,
    ) -> Result<RouteOutcome, OmnichatError> {
        let Some(status) = content::map_status(&event.status) else {
            info!(status = %event.status, "unknown message status ignored");
            return Ok(RouteOutcome::Ignored {
                reason: format!("unknown status {}", event.status),
            });
        };
        let credential = ctx.credential;
        let Some(chat) = chats::get_chat_by_external(
            &self.db,
            credential.channel_id,
            credential.tenant_id,
            &event.chat_id,
        )
        .await?
        else {
            debug!(external_chat_id = %event.chat_id, "status for unknown chat");
            return Ok(RouteOutcome::Ignored {
                reason: "unknown chat".into(),
            });
        };
        let Some(message) =
            messages::update_status_by_external(&self.db, chat.id, &event.message_id, status)
                .await?
        else {
            debug!(chat_id = chat.id, external_message_id = %event.message_id, "status for unknown message");
            return Ok(RouteOutcome::Ignored {
                reason: "unknown message".into(),
            });
        };
        self.fanout.message(credential.tenant_id, &message);
        Ok(RouteOutcome::Status {
            chat_id: chat.id,
            message_id: message.id,
            status,
        })
    }

    async fn route_typing(
        &self,
        ctx: RouteContext<'_>,
        event: &TypingEvent,
    ) -> Result<RouteOutcome, OmnichatError> {
        let credential = ctx.credential;
        let Some(chat) = chats::get_chat_by_external(
            &self.db,
            credential.channel_id,
            credential.tenant_id,
            &event.chat_id,
        )
        .await?
        else {
            return Ok(RouteOutcome::Ignored {
                reason: "unknown chat".into(),
            });
        };
        let user_type = match event.author_id.as_deref() {
            Some(author) if author == credential.external_account_id => SenderType::Operator,
            _ => SenderType::Client,
        };
        let timestamp = omnichat_core::time::now();
        self.fanout.typing(
            credential.tenant_id,
            TypingView {
                chat_id: chat.id,
                user_id: event.author_id.clone(),
                user_type,
                is_typing: event.is_typing,
                timestamp: timestamp.clone(),
            },
        );
        self.bus
            .typing(&TypingPublished {
                chat_id: chat.id,
                user_id: event.author_id.clone(),
                user_type,
                is_typing: event.is_typing,
                timestamp,
            })
            .await;
        Ok(RouteOutcome::Typing { chat_id: chat.id })
    }
}

/// Name, phone and avatar carried by the event itself.
fn event_hints(event: &MessageEvent, sender: SenderType) -> ChatHints {
    let mut hints = ChatHints {
        metadata: event.metadata.clone(),
        ..ChatHints::default()
    };
    if let Some(item) = &event.item_id {
        hints.metadata.entry("ad_id").or_insert(Value::String(item.clone()));
    }
    if sender != SenderType::Client {
        return hints;
    }
    if let Some(author) = &event.author {
        hints.name = author.name.clone();
        hints.phone = author.phone.as_deref().and_then(phone::normalize_phone);
        hints.avatar = author.avatar.clone();
    }
    if hints.name.is_none() {
        hints.name = event.chat_title.clone();
    }
    if hints.phone.is_none() {
        let text = match &event.body {
            MessageBody::Text { text } => Some(text.as_str()),
            _ => event.caption.as_deref(),
        };
        hints.phone = text.and_then(phone::extract_phone);
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnichat_core::types::{ChannelType, RemoteUser};

    fn credential() -> CredentialRef {
        CredentialRef {
            credential_id: 1,
            channel_id: 1,
            channel_type: ChannelType::Avito,
            tenant_id: 7,
            external_account_id: "42".into(),
        }
    }

    fn text_event(author: &str, text: &str) -> MessageEvent {
        MessageEvent {
            id: "m1".into(),
            chat_id: "c1".into(),
            author_id: Some(author.into()),
            created: 1_700_000_000,
            body: MessageBody::Text { text: text.into() },
            ..MessageEvent::default()
        }
    }

    async fn router() -> EventRouter {
        let db = Database::open(":memory:").await.unwrap();
        EventRouter::new(db, Arc::new(Fanout::default()), MessageBus::disabled())
    }

    #[tokio::test]
    async fn direction_follows_account_id() {
        let router = router().await;
        let credential = credential();
        let ctx = RouteContext::new(&credential, None);
        assert_eq!(router.direction(ctx, &text_event("42", "hi")), SenderType::Operator);
        assert_eq!(router.direction(ctx, &text_event("99", "hi")), SenderType::Client);

        let legacy = CredentialRef {
            external_account_id: String::new(),
            ..credential.clone()
        };
        let ctx = RouteContext::new(&legacy, None);
        assert_eq!(router.direction(ctx, &text_event("42", "hi")), SenderType::Client);
    }

    #[test]
    fn phone_hint_only_for_clients() {
        let event = text_event("99", "call me 8 903 123 45 67");
        assert_eq!(
            event_hints(&event, SenderType::Client).phone.as_deref(),
            Some("+79031234567")
        );
        assert_eq!(event_hints(&event, SenderType::Operator).phone, None);
    }

    #[test]
    fn remote_hints_skip_own_account() {
        let remote = RemoteChat {
            id: "c1".into(),
            created: None,
            updated: None,
            last_message: None,
            users: vec![
                RemoteUser {
                    id: "42".into(),
                    name: Some("Shop".into()),
                    phone: None,
                    avatar: None,
                },
                RemoteUser {
                    id: "99".into(),
                    name: Some("Ivan".into()),
                    phone: Some("8 (903) 123-45-67".into()),
                    avatar: Some("https://a/99.png".into()),
                },
            ],
            context: Default::default(),
        };
        let hints = ChatHints::from_remote(&remote, "42");
        assert_eq!(hints.name.as_deref(), Some("Ivan"));
        assert_eq!(hints.phone.as_deref(), Some("+79031234567"));
        assert_eq!(hints.metadata["user_id"], "99");
    }
}
