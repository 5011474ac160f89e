// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime fanout to connected operators.
//!
//! Two hubs share one process: per-chat (operators viewing a thread) and
//! per-tenant (operators monitoring every thread of their business). The
//! [`Fanout`] helpers emit both scopes for one event, so chat order is the
//! order callers publish in.

pub mod frames;
pub mod hub;

use omnichat_core::types::{ChatMessage, MessageType, TenantId};

pub use frames::{
    ChatFrame, ErrorFrame, Inbound, InboundMessage, MessageView, PresenceView, TenantFrame,
    TypingView,
};
pub use hub::{ConnectedUser, ConnectionId, Hub};

/// Default per-connection queue length.
pub const DEFAULT_QUEUE: usize = 256;

/// Per-chat and per-tenant hubs.
#[derive(Debug)]
pub struct Fanout {
    chats: Hub<i64>,
    tenants: Hub<TenantId>,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE)
    }
}

impl Fanout {
    pub fn new(queue_size: usize) -> Self {
        Self {
            chats: Hub::new("chat", queue_size),
            tenants: Hub::new("tenant", queue_size),
        }
    }

    pub fn chats(&self) -> &Hub<i64> {
        &self.chats
    }

    pub fn tenants(&self) -> &Hub<TenantId> {
        &self.tenants
    }

    /// A message was persisted (inbound, outbound, or a status change).
    pub fn message(&self, tenant_id: TenantId, message: &ChatMessage) -> usize {
        let view = MessageView::from(message);
        let reached = self
            .chats
            .broadcast(message.chat_id, &ChatFrame::Message(view.clone()));
        reached + self.tenants.broadcast(tenant_id, &TenantFrame::new_message(view))
    }

    pub fn typing(&self, tenant_id: TenantId, typing: TypingView) -> usize {
        let reached = self
            .chats
            .broadcast(typing.chat_id, &ChatFrame::Typing(typing.clone()));
        reached + self.tenants.broadcast(tenant_id, &TenantFrame::typing(typing))
    }

    pub fn user_connected(&self, tenant_id: TenantId, presence: PresenceView) -> usize {
        let reached = self
            .chats
            .broadcast(presence.chat_id, &ChatFrame::UserConnected(presence.clone()));
        reached
            + self
                .tenants
                .broadcast(tenant_id, &TenantFrame::user_connected(presence))
    }

    pub fn user_disconnected(&self, tenant_id: TenantId, presence: PresenceView) -> usize {
        let reached = self
            .chats
            .broadcast(presence.chat_id, &ChatFrame::UserDisconnected(presence.clone()));
        reached
            + self
                .tenants
                .broadcast(tenant_id, &TenantFrame::user_disconnected(presence))
    }

    /// Reject an operator message composed twice within the dedup window.
    pub fn duplicate(&self, chat_id: i64, content: &str, message_type: MessageType) -> usize {
        self.chats.broadcast(
            chat_id,
            &ChatFrame::DuplicateMessage {
                chat_id,
                content: content.to_string(),
                message_type,
                detail: "the same message was sent moments ago".to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnichat_core::types::{MessageSource, MessageStatus, MessageType, SenderType};
    use serde_json::Value;

    fn message() -> ChatMessage {
        ChatMessage {
            id: 1,
            chat_id: 10,
            sender_type: SenderType::Client,
            content: "hi".into(),
            message_type: MessageType::Text,
            external_message_id: Some("m1".into()),
            status: MessageStatus::Sent,
            source: MessageSource::Webhook,
            created_at: "2023-11-14T22:13:20.000Z".into(),
            updated_at: "2023-11-14T22:13:20.000Z".into(),
        }
    }

    #[tokio::test]
    async fn message_reaches_chat_and_tenant_scopes() {
        let fanout = Fanout::default();
        let (_c, mut chat_rx) = fanout.chats().connect(10, 1);
        let (_t, mut tenant_rx) = fanout.tenants().connect(5, 2);
        let (_o, mut other_rx) = fanout.tenants().connect(6, 3);

        assert_eq!(fanout.message(5, &message()), 2);

        let chat: Value = serde_json::from_str(&chat_rx.recv().await.unwrap()).unwrap();
        assert_eq!(chat["type"], "message");
        let tenant: Value = serde_json::from_str(&tenant_rx.recv().await.unwrap()).unwrap();
        assert_eq!(tenant["type"], "chat_message");
        assert_eq!(tenant["event"], "new_message");
        assert_eq!(tenant["message_id"], 1);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_goes_to_chat_only() {
        let fanout = Fanout::default();
        let (_c, mut chat_rx) = fanout.chats().connect(10, 1);
        let (_t, mut tenant_rx) = fanout.tenants().connect(5, 2);
        fanout.duplicate(10, "hi", MessageType::Text);
        let frame: Value = serde_json::from_str(&chat_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "duplicate_message");
        assert!(tenant_rx.try_recv().is_err());
    }
}
