// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored message content and type for each canonical body.

use std::str::FromStr;

use omnichat_core::event::MessageBody;
use omnichat_core::types::{MessageStatus, MessageType};

/// Image sizes in order of preference.
pub const PREFERRED_IMAGE_SIZES: [&str; 2] = ["1280x960", "640x480"];

/// An attachment URL to record against the stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub url: String,
    pub size: Option<i64>,
}

/// What gets persisted for one message body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
}

pub fn message_type(body: &MessageBody) -> MessageType {
    match body {
        MessageBody::Text { .. } => MessageType::Text,
        MessageBody::Image { .. } => MessageType::Image,
        MessageBody::Voice { .. } => MessageType::Voice,
        MessageBody::Video { .. } => MessageType::Video,
        MessageBody::File { .. } | MessageBody::Item { .. } => MessageType::Document,
        MessageBody::Location { .. } | MessageBody::Link { .. } | MessageBody::Call { .. } => {
            MessageType::Text
        }
        MessageBody::System { .. } => MessageType::System,
        MessageBody::Unknown { .. } => MessageType::Text,
    }
}

/// `1280x960`, then `640x480`, then whatever comes first.
pub fn best_image(sizes: &[(String, String)]) -> Option<&str> {
    PREFERRED_IMAGE_SIZES
        .iter()
        .find_map(|wanted| {
            sizes
                .iter()
                .find(|(label, _)| label == wanted)
                .map(|(_, url)| url.as_str())
        })
        .or_else(|| sizes.first().map(|(_, url)| url.as_str()))
}

/// URL already present in the payload, if any.
pub fn shipped_url(body: &MessageBody) -> Option<&str> {
    match body {
        MessageBody::Image { sizes, url, .. } => url.as_deref().or_else(|| best_image(sizes)),
        MessageBody::Voice { url, .. }
        | MessageBody::Video { url, .. }
        | MessageBody::File { url, .. } => url.as_deref(),
        _ => None,
    }
    .filter(|u| !u.is_empty())
}

/// Platform handle to resolve through `get_media_url` when no URL is shipped.
pub fn media_handle(body: &MessageBody) -> Option<&str> {
    match body {
        MessageBody::Voice { voice_id, .. } => voice_id.as_deref(),
        MessageBody::Image { media_id, .. }
        | MessageBody::Video { media_id, .. }
        | MessageBody::File { media_id, .. } => media_id.as_deref(),
        _ => None,
    }
    .filter(|id| !id.is_empty())
}

/// Render a body into stored content.
///
/// `url` is the resolved media URL. A caption, when the platform sends
/// one, replaces the bracketed placeholder of image, video and file
/// messages.
pub fn render(body: &MessageBody, caption: Option<&str>, url: Option<&str>) -> Rendered {
    let caption = caption.map(str::trim).filter(|c| !c.is_empty());
    let with_caption = |placeholder: String| caption.map_or(placeholder, str::to_string);
    let content = match body {
        MessageBody::Text { text } => {
            if text.is_empty() {
                caption.unwrap_or_default().to_string()
            } else {
                text.clone()
            }
        }
        MessageBody::Image { .. } => with_caption(match url {
            Some(url) => format!("[Image: {url}]"),
            None => "[Image message]".to_string(),
        }),
        MessageBody::Voice { duration, .. } => match (duration, url) {
            (Some(d), Some(url)) => format!("[Voice message: {}s - {url}]", format_duration(*d)),
            (Some(d), None) => format!("[Voice message: {}s]", format_duration(*d)),
            (None, Some(url)) => format!("[Voice message: {url}]"),
            (None, None) => "[Voice message]".to_string(),
        },
        MessageBody::Video { .. } => with_caption(match url {
            Some(url) => format!("[Video: {url}]"),
            None => "[Video message]".to_string(),
        }),
        MessageBody::File { name, .. } => with_caption(match name {
            Some(name) => format!("[File: {name}]"),
            None => "[Document]".to_string(),
        }),
        MessageBody::Location {
            latitude,
            longitude,
            title,
        } => match (latitude, longitude) {
            (Some(lat), Some(lon)) => match title {
                Some(title) => format!("[Location: {title} ({lat}, {lon})]"),
                None => format!("[Location: {lat}, {lon}]"),
            },
            _ => "[Location]".to_string(),
        },
        MessageBody::Link { text, url } => match (text, url) {
            (Some(text), _) => text.clone(),
            (None, Some(url)) => format!("[Link: {url}]"),
            (None, None) => "[Link]".to_string(),
        },
        MessageBody::Item { title, .. } => match title {
            Some(title) => format!("[Item: {title}]"),
            None => "[Item]".to_string(),
        },
        MessageBody::Call { status } => match status {
            Some(status) => format!("[Call: {status}]"),
            None => "[Call]".to_string(),
        },
        MessageBody::System { text } => text
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "[System message]".to_string()),
        MessageBody::Unknown { .. } => "[Unknown message type]".to_string(),
    };

    let size = match body {
        MessageBody::File { size, .. } => *size,
        _ => None,
    };
    let attachments = match body {
        MessageBody::Image { .. }
        | MessageBody::Voice { .. }
        | MessageBody::Video { .. }
        | MessageBody::File { .. } => url
            .map(|url| Attachment {
                url: url.to_string(),
                size,
            })
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };

    Rendered {
        content,
        message_type: message_type(body),
        attachments,
    }
}

fn format_duration(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as i64)
    } else {
        format!("{seconds:.1}")
    }
}

/// Map a platform status string. Unknown strings yield `None`.
pub fn map_status(raw: &str) -> Option<MessageStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "read" => Some(MessageStatus::Read),
        "deleted" => Some(MessageStatus::Deleted),
        other => MessageStatus::from_str(&other.to_ascii_uppercase()).ok(),
    }
}
