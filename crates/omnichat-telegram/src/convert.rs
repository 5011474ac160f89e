// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of Bot API `Update` objects into the canonical event model.
//!
//! Handles `message`, `edited_message` and `callback_query`. Everything
//! else is reported as ignored so the caller can still advance its offset.

use omnichat_core::event::{MessageBody, MessageEvent, id_string};
use omnichat_core::types::RemoteUser;
use serde_json::{Map, Value, json};

/// Placeholder content for a button press without callback data.
pub const BUTTON_PLACEHOLDER: &str = "[Button]";

/// A converted update.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundUpdate {
    pub update_id: Option<i64>,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// A regular or edited message.
    Message {
        event: MessageEvent,
        media_group_id: Option<String>,
        /// Contact card shared by the sender.
        shared_contact: Option<RemoteUser>,
    },
    /// An inline keyboard press, stored as a SYSTEM message and
    /// acknowledged with `answerCallbackQuery`.
    Callback {
        callback_query_id: String,
        event: MessageEvent,
    },
    Ignored {
        reason: &'static str,
    },
}

/// Convert one raw update.
pub fn parse_update(raw: &Value) -> InboundUpdate {
    let update_id = raw.get("update_id").and_then(Value::as_i64);
    let kind = if let Some(callback) = raw.get("callback_query") {
        callback_kind(callback)
    } else if let Some(message) = raw.get("message").or_else(|| raw.get("edited_message")) {
        message_kind(message)
    } else {
        UpdateKind::Ignored {
            reason: "no supported update",
        }
    };
    InboundUpdate { update_id, kind }
}

fn callback_kind(callback: &Value) -> UpdateKind {
    let Some(callback_query_id) = callback.get("id").and_then(id_string) else {
        return UpdateKind::Ignored {
            reason: "callback without id",
        };
    };
    let message = callback.get("message").unwrap_or(&Value::Null);
    let chat = message.get("chat").unwrap_or(&Value::Null);
    let Some(chat_id) = chat.get("id").and_then(id_string) else {
        return UpdateKind::Ignored {
            reason: "no chat id",
        };
    };
    let from = callback.get("from").unwrap_or(&Value::Null);
    let author = sender(from);
    let text = callback
        .get("data")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(BUTTON_PLACEHOLDER)
        .to_string();

    let event = MessageEvent {
        id: callback_query_id.clone(),
        chat_id: chat_id.clone(),
        author_id: author.as_ref().map(|a| a.id.clone()),
        created: chrono::Utc::now().timestamp(),
        body: MessageBody::System { text: Some(text) },
        chat_title: Some(chat_name(from, &chat_id)),
        metadata: metadata(from, &Value::Null),
        author,
        ..MessageEvent::default()
    };
    UpdateKind::Callback {
        callback_query_id,
        event,
    }
}

fn message_kind(message: &Value) -> UpdateKind {
    let chat = message.get("chat").unwrap_or(&Value::Null);
    let Some(chat_id) = chat.get("id").and_then(id_string) else {
        return UpdateKind::Ignored {
            reason: "no chat id",
        };
    };
    let Some(message_id) = message.get("message_id").and_then(id_string) else {
        return UpdateKind::Ignored {
            reason: "message without id",
        };
    };
    let from = message.get("from").unwrap_or(&Value::Null);
    let author = sender(from);

    let text = str_of(message, "text");
    let caption = str_of(message, "caption");
    let body = body_of(message, text.as_deref());

    let shared_contact = message.get("contact").and_then(|contact| {
        let phone = str_of(contact, "phone_number")?;
        Some(RemoteUser {
            id: contact
                .get("user_id")
                .and_then(id_string)
                .unwrap_or_default(),
            name: str_of(contact, "first_name").or_else(|| str_of(contact, "last_name")),
            phone: Some(phone),
            avatar: None,
        })
    });

    let event = MessageEvent {
        id: message_id,
        chat_id: chat_id.clone(),
        author_id: author.as_ref().map(|a| a.id.clone()),
        created: message.get("date").and_then(Value::as_i64).unwrap_or(0),
        body,
        caption,
        chat_type: str_of(chat, "type"),
        chat_title: Some(chat_name(from, &chat_id)),
        metadata: metadata(from, chat),
        author,
        ..MessageEvent::default()
    };
    UpdateKind::Message {
        event,
        media_group_id: message.get("media_group_id").and_then(id_string),
        shared_contact,
    }
}

fn body_of(message: &Value, text: Option<&str>) -> MessageBody {
    if let Some(photo) = message.get("photo").and_then(Value::as_array)
        && let Some(best) = largest_size(photo)
    {
        return MessageBody::Image {
            sizes: Vec::new(),
            url: None,
            media_id: best.get("file_id").and_then(id_string),
        };
    }
    if let Some(doc) = message.get("document") {
        return MessageBody::File {
            name: str_of(doc, "file_name"),
            url: None,
            size: doc.get("file_size").and_then(Value::as_i64),
            media_id: doc.get("file_id").and_then(id_string),
        };
    }
    if let Some(video) = message.get("video") {
        return MessageBody::Video {
            url: None,
            media_id: video.get("file_id").and_then(id_string),
        };
    }
    if let Some(voice) = message.get("voice").or_else(|| message.get("audio")) {
        return MessageBody::Voice {
            voice_id: voice.get("file_id").and_then(id_string),
            url: None,
            duration: voice.get("duration").and_then(Value::as_f64),
        };
    }
    if let Some(location) = message.get("location") {
        return MessageBody::Location {
            latitude: location.get("latitude").and_then(Value::as_f64),
            longitude: location.get("longitude").and_then(Value::as_f64),
            title: None,
        };
    }
    if let Some(sticker) = message.get("sticker") {
        let text = match str_of(sticker, "emoji") {
            Some(emoji) => format!("[Sticker {emoji}]"),
            None => "[Sticker]".to_string(),
        };
        return MessageBody::System { text: Some(text) };
    }
    if let Some(contact) = message.get("contact") {
        let phone = str_of(contact, "phone_number").unwrap_or_default();
        return MessageBody::Text {
            text: format!("[Contact: {phone}]"),
        };
    }
    MessageBody::Text {
        text: text.unwrap_or("[Message]").to_string(),
    }
}

/// Largest entry of a `PhotoSize` array, by file size then area.
pub fn largest_size(sizes: &[Value]) -> Option<&Value> {
    sizes.iter().max_by_key(|size| {
        let bytes = size.get("file_size").and_then(Value::as_i64).unwrap_or(0);
        let area = size.get("width").and_then(Value::as_i64).unwrap_or(0)
            * size.get("height").and_then(Value::as_i64).unwrap_or(0);
        (bytes, area)
    })
}

/// Participant built from a Bot API `User`.
pub fn sender(from: &Value) -> Option<RemoteUser> {
    let id = from.get("id").and_then(id_string)?;
    Some(RemoteUser {
        id,
        name: contact_name(from),
        phone: None,
        avatar: None,
    })
}

/// `first_name last_name`, else `username`.
pub fn contact_name(user: &Value) -> Option<String> {
    let first = str_of(user, "first_name").unwrap_or_default();
    let last = str_of(user, "last_name").unwrap_or_default();
    let full = format!("{first} {last}").trim().to_string();
    if !full.is_empty() {
        return Some(full);
    }
    str_of(user, "username")
}

/// `Telegram @{username} ({chat_id})`, else `Telegram {chat_id}`.
pub fn chat_name(user: &Value, chat_id: &str) -> String {
    match str_of(user, "username") {
        Some(username) => format!("Telegram @{username} ({chat_id})"),
        None => format!("Telegram {chat_id}"),
    }
}

fn metadata(user: &Value, chat: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("source".into(), json!("telegram"));
    map.insert("username".into(), json!(str_of(user, "username")));
    if chat.is_object() {
        map.insert("chat_title".into(), json!(str_of(chat, "title")));
        map.insert("chat_type".into(), json!(str_of(chat, "type")));
    }
    map
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
