// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged with operator sockets.
//!
//! Per-chat sockets receive [`ChatFrame`]s; per-tenant sockets receive
//! [`TenantFrame`]s, which carry an extra `event` discriminator. Failures are
//! reported as a bare [`ErrorFrame`].

use omnichat_core::types::{ChatMessage, MessageStatus, MessageType, SenderType, TenantId};
use serde::{Deserialize, Serialize};

use crate::hub::ConnectedUser;

/// Message fields shared by chat and tenant frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub timestamp: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(m: &ChatMessage) -> Self {
        Self {
            message_id: m.id,
            chat_id: m.chat_id,
            sender_type: m.sender_type,
            content: m.content.clone(),
            message_type: m.message_type,
            status: m.status,
            timestamp: m.created_at.clone(),
        }
    }
}

/// Typing indicator, from an operator socket or a platform event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingView {
    pub chat_id: i64,
    /// Operator id, or the platform author id for client typing.
    pub user_id: Option<String>,
    pub user_type: SenderType,
    pub is_typing: bool,
    pub timestamp: String,
}

/// Presence change of one operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceView {
    pub chat_id: i64,
    pub user_id: i64,
    pub user_type: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    Connected {
        chat_id: i64,
        user_id: i64,
        timestamp: String,
    },
    Message(MessageView),
    Typing(TypingView),
    UserConnected(PresenceView),
    UserDisconnected(PresenceView),
    UsersList {
        chat_id: i64,
        users: Vec<ConnectedUser>,
    },
    DuplicateMessage {
        chat_id: i64,
        content: String,
        message_type: MessageType,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TenantFrame {
    Connected {
        tenant_id: TenantId,
        user_id: i64,
        timestamp: String,
    },
    ChatMessage {
        event: &'static str,
        #[serde(flatten)]
        message: MessageView,
    },
    ChatTyping {
        event: &'static str,
        #[serde(flatten)]
        typing: TypingView,
    },
    ChatUserConnected {
        event: &'static str,
        #[serde(flatten)]
        presence: PresenceView,
    },
    ChatUserDisconnected {
        event: &'static str,
        #[serde(flatten)]
        presence: PresenceView,
    },
    UsersList {
        tenant_id: TenantId,
        users: Vec<ConnectedUser>,
    },
}

impl TenantFrame {
    pub fn new_message(message: MessageView) -> Self {
        Self::ChatMessage {
            event: "new_message",
            message,
        }
    }

    pub fn typing(typing: TypingView) -> Self {
        Self::ChatTyping {
            event: "typing",
            typing,
        }
    }

    pub fn user_connected(presence: PresenceView) -> Self {
        Self::ChatUserConnected {
            event: "user_connected",
            presence,
        }
    }

    pub fn user_disconnected(presence: PresenceView) -> Self {
        Self::ChatUserDisconnected {
            event: "user_disconnected",
            presence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFrame {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            error: error.into(),
            detail,
        }
    }
}

/// Frames an operator may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Message(InboundMessage),
    Typing {
        #[serde(default = "default_true")]
        is_typing: bool,
    },
    GetUsers,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn view() -> MessageView {
        MessageView {
            message_id: 7,
            chat_id: 3,
            sender_type: SenderType::Client,
            content: "hello".into(),
            message_type: MessageType::Text,
            status: MessageStatus::Sent,
            timestamp: "2023-11-14T22:13:20.000Z".into(),
        }
    }

    #[test]
    fn chat_message_frame_shape() {
        let value: Value = serde_json::to_value(ChatFrame::Message(view())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "message",
                "message_id": 7,
                "chat_id": 3,
                "sender_type": "CLIENT",
                "content": "hello",
                "message_type": "TEXT",
                "status": "SENT",
                "timestamp": "2023-11-14T22:13:20.000Z"
            })
        );
    }

    #[test]
    fn tenant_frame_carries_event() {
        let value = serde_json::to_value(TenantFrame::new_message(view())).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["event"], "new_message");
        assert_eq!(value["chat_id"], 3);

        let typing = serde_json::to_value(TenantFrame::typing(TypingView {
            chat_id: 3,
            user_id: Some("9".into()),
            user_type: SenderType::Operator,
            is_typing: true,
            timestamp: "t".into(),
        }))
        .unwrap();
        assert_eq!(typing["type"], "chat_typing");
        assert_eq!(typing["event"], "typing");
        assert_eq!(typing["user_type"], "OPERATOR");
    }

    #[test]
    fn parses_operator_frames() {
        let msg: Inbound = serde_json::from_str(
            r#"{"type":"message","sender_type":"operator","message_type":"TEXT","content":"hi"}"#,
        )
        .unwrap();
        match msg {
            Inbound::Message(m) => {
                assert_eq!(m.content, "hi");
                assert_eq!(m.sender_type.as_deref(), Some("operator"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            serde_json::from_str::<Inbound>(r#"{"type":"typing"}"#).unwrap(),
            Inbound::Typing { is_typing: true }
        );
        assert_eq!(
            serde_json::from_str::<Inbound>(r#"{"type":"get_users"}"#).unwrap(),
            Inbound::GetUsers
        );
    }

    #[test]
    fn error_frame_omits_missing_detail() {
        let value = serde_json::to_value(ErrorFrame::new("Chat not found", None)).unwrap();
        assert_eq!(value, json!({"error": "Chat not found"}));
    }
}
