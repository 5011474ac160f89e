// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical inbound event model.
//!
//! Platforms deliver loosely-typed JSON. Everything is normalised here into
//! [`PlatformEvent`] so downstream code never touches raw payloads. The
//! webhook envelope is `{id, version, timestamp, payload: {type, value}}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::OmnichatError;
use crate::types::RemoteUser;

/// Canonical webhook envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebhookEnvelope {
    pub id: String,
    pub version: String,
    pub timestamp: i64,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl WebhookEnvelope {
    /// Parse and shape-check a raw webhook body.
    pub fn parse(body: &[u8]) -> Result<Self, OmnichatError> {
        let envelope: Self = serde_json::from_slice(body)
            .map_err(|e| OmnichatError::Validation(format!("malformed webhook envelope: {e}")))?;
        if envelope.id.trim().is_empty() {
            return Err(OmnichatError::Validation("webhook id is empty".into()));
        }
        if !envelope.payload.value.is_object() {
            return Err(OmnichatError::Validation(
                "webhook payload.value must be an object".into(),
            ));
        }
        Ok(envelope)
    }

    /// Account the event was delivered for, when the platform includes it.
    pub fn account_id(&self) -> Option<String> {
        let value = &self.payload.value;
        ["user_id", "account_id", "seller_id"]
            .iter()
            .find_map(|k| value.get(*k).and_then(id_string))
    }

    /// Normalise the payload into a [`PlatformEvent`].
    pub fn into_event(self) -> Result<PlatformEvent, OmnichatError> {
        let value = self.payload.value;
        match self.payload.kind.as_str() {
            "message" => {
                let wire: WireMessage = serde_json::from_value(value).map_err(|e| {
                    OmnichatError::Validation(format!("invalid message event: {e}"))
                })?;
                let mut event = wire.into_event()?;
                if event.created == 0 {
                    event.created = self.timestamp;
                }
                Ok(PlatformEvent::Message(event))
            }
            "status" => {
                let wire: WireStatus = serde_json::from_value(value).map_err(|e| {
                    OmnichatError::Validation(format!("invalid status event: {e}"))
                })?;
                Ok(PlatformEvent::Status(wire.into_event()?))
            }
            "typing" => {
                let wire: WireTyping = serde_json::from_value(value).map_err(|e| {
                    OmnichatError::Validation(format!("invalid typing event: {e}"))
                })?;
                Ok(PlatformEvent::Typing(wire.into_event()?))
            }
            other => Ok(PlatformEvent::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

/// A normalised platform event.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Message(MessageEvent),
    Status(StatusEvent),
    Typing(TypingEvent),
    Unknown { kind: String },
}

/// A single chat message from a platform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEvent {
    pub id: String,
    pub chat_id: String,
    /// Account that owns the conversation (the integration side).
    pub user_id: Option<String>,
    /// Author of this message.
    pub author_id: Option<String>,
    /// Unix seconds.
    pub created: i64,
    pub body: MessageBody,
    /// Text sent alongside media; replaces the bracketed placeholder.
    pub caption: Option<String>,
    pub chat_type: Option<String>,
    pub item_id: Option<String>,
    /// Author profile hints, when the platform ships them inline.
    pub author: Option<RemoteUser>,
    /// Display name for the chat, when the platform ships one.
    pub chat_title: Option<String>,
    /// Extra keys merged into the chat metadata.
    pub metadata: Map<String, Value>,
}

/// Typed message content.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text {
        text: String,
    },
    Image {
        /// `(size label, url)` pairs, e.g. `("1280x960", "https://...")`.
        sizes: Vec<(String, String)>,
        url: Option<String>,
        /// Platform file handle to resolve when no URL is shipped.
        media_id: Option<String>,
    },
    Voice {
        voice_id: Option<String>,
        url: Option<String>,
        duration: Option<f64>,
    },
    Video {
        url: Option<String>,
        media_id: Option<String>,
    },
    File {
        name: Option<String>,
        url: Option<String>,
        size: Option<i64>,
        media_id: Option<String>,
    },
    Location {
        latitude: Option<f64>,
        longitude: Option<f64>,
        title: Option<String>,
    },
    Link {
        text: Option<String>,
        url: Option<String>,
    },
    Item {
        title: Option<String>,
        url: Option<String>,
    },
    Call {
        status: Option<String>,
    },
    System {
        text: Option<String>,
    },
    Unknown {
        kind: String,
    },
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::Text {
            text: String::new(),
        }
    }
}

impl MessageBody {
    /// Platform type label (`text`, `image`, ...).
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Voice { .. } => "voice",
            Self::Video { .. } => "video",
            Self::File { .. } => "file",
            Self::Location { .. } => "location",
            Self::Link { .. } => "link",
            Self::Item { .. } => "item",
            Self::Call { .. } => "appCall",
            Self::System { .. } => "system",
            Self::Unknown { kind } => kind,
        }
    }

    /// Parse a typed body out of the `content` object of a message.
    pub fn from_wire(kind: &str, content: &Value) -> Self {
        let section = |name: &str| content.get(name).cloned().unwrap_or(Value::Null);
        match kind {
            "text" => Self::Text {
                text: str_field(content, &["text"]).unwrap_or_default(),
            },
            "image" => {
                let image = section("image");
                let sizes = image
                    .get("sizes")
                    .and_then(Value::as_object)
                    .map(|m| {
                        m.iter()
                            .filter_map(|(k, v)| v.as_str().map(|u| (k.clone(), u.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                Self::Image {
                    sizes,
                    url: str_field(&image, &["url"]),
                    media_id: image.get("image_id").and_then(id_string),
                }
            }
            "voice" => {
                let voice = section("voice");
                Self::Voice {
                    voice_id: voice.get("voice_id").and_then(id_string),
                    url: str_field(&voice, &["url", "voice_url"]),
                    duration: voice.get("duration").and_then(Value::as_f64),
                }
            }
            "video" => {
                let video = section("video");
                Self::Video {
                    url: str_field(&video, &["url"]),
                    media_id: video.get("video_id").and_then(id_string),
                }
            }
            "file" | "document" => {
                let file = section("file");
                Self::File {
                    name: str_field(&file, &["name"]),
                    url: str_field(&file, &["url"]),
                    size: file.get("size").and_then(Value::as_i64),
                    media_id: file.get("file_id").and_then(id_string),
                }
            }
            "location" => {
                let loc = section("location");
                Self::Location {
                    latitude: loc
                        .get("lat")
                        .or_else(|| loc.get("latitude"))
                        .and_then(Value::as_f64),
                    longitude: loc
                        .get("lon")
                        .or_else(|| loc.get("longitude"))
                        .and_then(Value::as_f64),
                    title: str_field(&loc, &["title", "text"]),
                }
            }
            "link" => {
                let link = section("link");
                Self::Link {
                    text: str_field(&link, &["text"]),
                    url: str_field(&link, &["url"]),
                }
            }
            "item" => {
                let item = section("item");
                Self::Item {
                    title: str_field(&item, &["title"]),
                    url: str_field(&item, &["item_url", "url"]),
                }
            }
            "appCall" | "call" => Self::Call {
                status: str_field(&section("call"), &["status"]),
            },
            "system" => Self::System {
                text: str_field(content, &["text"]),
            },
            other => Self::Unknown {
                kind: other.to_string(),
            },
        }
    }
}

/// Delivery status change for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub chat_id: String,
    pub message_id: String,
    /// Raw platform status label (`read`, `deleted`, ...).
    pub status: String,
}

/// Typing indicator. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub chat_id: String,
    pub author_id: Option<String>,
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default, deserialize_with = "opt_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    chat_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    author_id: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    chat_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    item_id: Option<String>,
    #[serde(default)]
    content: Value,
}

impl WireMessage {
    fn into_event(self) -> Result<MessageEvent, OmnichatError> {
        let id = self
            .id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OmnichatError::Validation("message event without id".into()))?;
        let chat_id = self
            .chat_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OmnichatError::Validation("message event without chat_id".into()))?;
        let kind = self.kind.unwrap_or_else(|| "text".to_string());
        Ok(MessageEvent {
            id,
            chat_id,
            user_id: self.user_id,
            author_id: self.author_id,
            created: self.created.unwrap_or(0),
            body: MessageBody::from_wire(&kind, &self.content),
            chat_type: self.chat_type,
            item_id: self.item_id,
            ..MessageEvent::default()
        })
    }
}

/// Convert one element of a platform message listing.
///
/// Listing entries use the same field names as webhook values, except the
/// chat id comes from the request path.
pub fn message_from_listing(chat_id: &str, raw: &Value) -> Result<MessageEvent, OmnichatError> {
    let mut wire: WireMessage = serde_json::from_value(raw.clone())
        .map_err(|e| OmnichatError::Validation(format!("invalid listed message: {e}")))?;
    if wire.chat_id.is_none() {
        wire.chat_id = Some(chat_id.to_string());
    }
    wire.into_event()
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default, deserialize_with = "opt_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    chat_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    read: Option<i64>,
}

impl WireStatus {
    fn into_event(self) -> Result<StatusEvent, OmnichatError> {
        let status = match (self.status, self.read) {
            (Some(s), _) => s,
            (None, Some(_)) => "read".to_string(),
            (None, None) => {
                return Err(OmnichatError::Validation("status event without status".into()));
            }
        };
        Ok(StatusEvent {
            chat_id: self
                .chat_id
                .ok_or_else(|| OmnichatError::Validation("status event without chat_id".into()))?,
            message_id: self
                .id
                .ok_or_else(|| OmnichatError::Validation("status event without id".into()))?,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireTyping {
    #[serde(default, deserialize_with = "opt_id")]
    chat_id: Option<String>,
    #[serde(default, alias = "authorId", deserialize_with = "opt_id")]
    author_id: Option<String>,
    #[serde(default, alias = "isTyping")]
    is_typing: Option<bool>,
}

impl WireTyping {
    fn into_event(self) -> Result<TypingEvent, OmnichatError> {
        Ok(TypingEvent {
            chat_id: self
                .chat_id
                .ok_or_else(|| OmnichatError::Validation("typing event without chat_id".into()))?,
            author_id: self.author_id,
            is_typing: self.is_typing.unwrap_or(true),
        })
    }
}

/// Platform ids arrive as strings or integers; both become strings.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_string))
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        value
            .get(*k)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
