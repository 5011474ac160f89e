// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing keys and payload shapes published to the broker.

use omnichat_core::types::{
    ChannelType, ChatMessage, MessageType, SenderType, TenantId,
};
use serde::Serialize;

pub const MESSAGES: &str = "chat.messages";
pub const TYPING: &str = "chat.events.typing";
pub const USER_CONNECTED: &str = "chat.events.user_connected";
pub const USER_DISCONNECTED: &str = "chat.events.user_disconnected";
pub const NEW_CHAT: &str = "chat.events.new_chat";

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePublished {
    pub message_id: i64,
    pub chat_id: i64,
    pub channel_type: Option<ChannelType>,
    pub external_message_id: Option<String>,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl MessagePublished {
    pub fn new(message: &ChatMessage, channel_type: Option<ChannelType>, user_id: Option<i64>) -> Self {
        Self {
            message_id: message.id,
            chat_id: message.chat_id,
            channel_type,
            external_message_id: message.external_message_id.clone(),
            sender_type: message.sender_type,
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at.clone(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingPublished {
    pub chat_id: i64,
    pub user_id: Option<String>,
    pub user_type: SenderType,
    pub is_typing: bool,
    pub timestamp: String,
}

/// Operator presence on a chat socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresencePublished {
    pub chat_id: i64,
    pub user_id: i64,
    pub user_type: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChatPublished {
    pub chat_id: i64,
    pub tenant_id: TenantId,
    pub channel_id: i64,
    pub timestamp: String,
}
