// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram updates through the event router.
//!
//! Used by both the polling workers and the webhook endpoint. Adds the
//! Telegram-only behaviour on top of routing: sender avatars, albums
//! (`media_group_id`), callback acknowledgement and shared contact cards.

use std::sync::Arc;

use async_trait::async_trait;
use omnichat_core::{OmnichatError, PlatformClient};
use omnichat_core::types::{ChannelType, CredentialRef, MessageSource};
use omnichat_storage::queries::{channels, chats, contacts, pictures};
use omnichat_telegram::{
    InboundUpdate, MediaGroups, TelegramClient, TelegramFactory, UpdateHandler, UpdateKind,
    parse_update,
};
use omnichat_vault::Vault;
use serde_json::Value;
use tracing::{debug, warn};

use crate::content;
use crate::ingestor::IngestOutcome;
use crate::phone;
use crate::router::{ChatHints, EventRouter, RouteContext, RouteOutcome};

pub struct TelegramUpdateHandler {
    router: Arc<EventRouter>,
    groups: MediaGroups,
}

impl std::fmt::Debug for TelegramUpdateHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramUpdateHandler")
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl TelegramUpdateHandler {
    pub fn new(router: Arc<EventRouter>, groups: MediaGroups) -> Self {
        Self { router, groups }
    }

    /// Process one raw update delivered for `client`'s bot.
    pub async fn process(
        &self,
        client: &TelegramClient,
        update: &Value,
    ) -> Result<IngestOutcome, OmnichatError> {
        let InboundUpdate { update_id, kind } = parse_update(update);
        let credential = client.credential().clone();
        let ctx = RouteContext::new(&credential, Some(client as &dyn PlatformClient))
            .with_source(MessageSource::Webhook);

        match kind {
            UpdateKind::Ignored { reason } => {
                debug!(update_id, reason, "telegram update ignored");
                Ok(IngestOutcome::Ignored {
                    reason: reason.to_string(),
                })
            }
            UpdateKind::Callback {
                callback_query_id,
                event,
            } => {
                if let Err(e) = client.answer_callback_query(&callback_query_id, "OK").await {
                    warn!(update_id, error = %e, "failed to answer callback query");
                }
                let routed = self
                    .router
                    .route_message(ctx, &event, ChatHints::default())
                    .await?;
                Ok(RouteOutcome::Message(routed).into())
            }
            UpdateKind::Message {
                mut event,
                media_group_id,
                shared_contact,
            } => {
                let group_key = media_group_id.map(|group| {
                    MediaGroups::key(credential.channel_id, &event.chat_id, &group)
                });
                if let Some(key) = &group_key
                    && let Some(message_id) = self.groups.message_for(key).await
                {
                    return self.attach_to_group(ctx, message_id, &event.body).await;
                }

                if let Some(author) = event.author.as_mut()
                    && author.avatar.is_none()
                {
                    author.avatar = client.avatar_url(&author.id).await;
                }

                let routed = self
                    .router
                    .route_message(ctx, &event, ChatHints::default())
                    .await?;
                if let Some(key) = group_key
                    && routed.created
                {
                    self.groups.remember(key, routed.message.id).await;
                }

                if let Some(contact) = shared_contact
                    && routed.created
                    && let Some(phone) = contact.phone.as_deref().and_then(phone::normalize_phone)
                {
                    self.link_shared_contact(&credential, routed.chat.id, &phone, contact.name)
                        .await;
                }
                Ok(RouteOutcome::Message(routed).into())
            }
        }
    }

    /// Look up a Telegram credential by id and process a webhook update.
    pub async fn process_webhook(
        &self,
        vault: &Vault,
        factory: &TelegramFactory,
        credential_id: i64,
        update: &Value,
    ) -> Result<IngestOutcome, OmnichatError> {
        let view = vault.load_by_id(credential_id).await?;
        let channel = channels::get_channel(vault.database(), view.channel_id)
            .await?
            .filter(|c| c.channel_type == ChannelType::Telegram)
            .ok_or_else(|| OmnichatError::NotFound {
                entity: "telegram credential",
                id: credential_id.to_string(),
            })?;
        let credential = view.credential_ref(channel.channel_type);
        let client = factory.client(&credential);
        match self.process(&client, update).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(credential_id, error = %e, "telegram webhook processing failed");
                Ok(IngestOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn attach_to_group(
        &self,
        ctx: RouteContext<'_>,
        message_id: i64,
        body: &omnichat_core::event::MessageBody,
    ) -> Result<IngestOutcome, OmnichatError> {
        let url = match (content::media_handle(body), ctx.client) {
            (Some(handle), Some(client)) => client.get_media_url(handle).await?,
            _ => None,
        };
        if let Some(url) = url {
            pictures::insert_picture(
                self.router.database(),
                message_id,
                &url,
                None,
                false,
                ctx.credential.tenant_id,
            )
            .await?;
        }
        debug!(message_id, "album item attached");
        Ok(IngestOutcome::Attached { message_id })
    }

    async fn link_shared_contact(
        &self,
        credential: &CredentialRef,
        chat_id: i64,
        phone: &str,
        name: Option<String>,
    ) {
        let db = self.router.database();
        if let Err(e) =
            chats::update_chat_hints(db, chat_id, name.clone(), Some(phone.to_string()), None).await
        {
            warn!(chat_id, error = %e, "failed to store shared contact on chat");
        }
        match contacts::find_or_create_by_phone(db, credential.channel_id, phone, name).await {
            Ok(contact) => {
                if let Err(e) = chats::set_chat_contact(db, chat_id, contact.id).await {
                    warn!(chat_id, error = %e, "failed to link shared contact");
                }
            }
            Err(e) => warn!(chat_id, error = %e, "failed to create contact from shared card"),
        }
    }
}

#[async_trait]
impl UpdateHandler for TelegramUpdateHandler {
    async fn handle_update(
        &self,
        client: &TelegramClient,
        update: Value,
    ) -> Result<(), OmnichatError> {
        self.process(client, &update).await.map(|_| ())
    }
}
