// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Avito JSON documents to domain types.

use omnichat_core::OmnichatError;
use omnichat_core::event::{id_string, message_from_listing};
use omnichat_core::types::{ChatContext, PlatformProfile, RemoteChat, RemoteUser, UploadedMedia};
use serde_json::Value;
use tracing::warn;

/// Preferred image size label, then the fallback.
pub const PREFERRED_SIZES: [&str; 2] = ["1280x960", "640x480"];

/// Unwrap a listing that is either a bare array or `{key: [...]}`.
pub fn list_of<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .as_array()
        .or_else(|| value.get(key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn remote_user(raw: &Value) -> Option<RemoteUser> {
    let id = raw.get("id").and_then(id_string)?;
    let profile = raw.get("public_user_profile");
    let avatar = profile
        .and_then(|p| p.get("avatar"))
        .and_then(|a| a.get("default").or_else(|| a.get("url")))
        .or_else(|| raw.get("avatar"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(RemoteUser {
        id,
        name: raw.get("name").and_then(Value::as_str).map(str::to_string),
        phone: raw.get("phone").and_then(Value::as_str).map(str::to_string),
        avatar,
    })
}

pub fn chat_context(raw: &Value) -> ChatContext {
    let Some(context) = raw.get("context").filter(|c| !c.is_null()) else {
        return ChatContext::default();
    };
    let item = context.get("value").unwrap_or(&Value::Null);
    ChatContext {
        ad_title: item.get("title").and_then(Value::as_str).map(str::to_string),
        ad_id: item.get("id").and_then(id_string),
        ad_url: item.get("url").and_then(Value::as_str).map(str::to_string),
        raw: Some(context.clone()),
    }
}

/// One chat document from a chat listing or lookup.
pub fn remote_chat(raw: &Value) -> Result<RemoteChat, OmnichatError> {
    let id = raw
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| OmnichatError::Validation("chat without id".into()))?;
    let last_message = match raw.get("last_message").filter(|m| m.is_object()) {
        Some(m) => match message_from_listing(&id, m) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(chat_id = %id, error = %e, "ignoring malformed last_message");
                None
            }
        },
        None => None,
    };
    Ok(RemoteChat {
        created: raw.get("created").and_then(Value::as_i64),
        updated: raw.get("updated").and_then(Value::as_i64),
        users: list_of(raw, "users").iter().filter_map(remote_user).collect(),
        context: chat_context(raw),
        last_message,
        id,
    })
}

pub fn profile(raw: &Value) -> Result<PlatformProfile, OmnichatError> {
    let external_account_id = raw
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| OmnichatError::Validation("account profile without id".into()))?;
    Ok(PlatformProfile {
        external_account_id,
        display_name: raw.get("name").and_then(Value::as_str).map(str::to_string),
        avatar: remote_user(raw).and_then(|u| u.avatar),
    })
}

/// `uploadImages` answers `{"<image_id>": {"<size>": "<url>", ...}}`.
pub fn uploaded_image(raw: &Value) -> Result<UploadedMedia, OmnichatError> {
    let (media_id, sizes) = raw
        .as_object()
        .and_then(|m| m.iter().next())
        .ok_or_else(|| OmnichatError::Platform {
            status: 200,
            message: "upload response carries no image id".into(),
        })?;
    let url = PREFERRED_SIZES
        .iter()
        .find_map(|size| sizes.get(*size).and_then(Value::as_str))
        .or_else(|| {
            sizes
                .as_object()
                .and_then(|m| m.values().find_map(Value::as_str))
        })
        .map(str::to_string);
    Ok(UploadedMedia {
        media_id: media_id.clone(),
        url,
    })
}

/// `getVoiceFiles` answers `{"voices_urls": {"<voice_id>": "<url>"}}`.
pub fn voice_url(raw: &Value, voice_id: &str) -> Option<String> {
    raw.get("voices_urls")
        .and_then(|m| m.get(voice_id))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnichat_core::MessageBody;
    use serde_json::json;

    #[test]
    fn chat_document_converts() {
        let raw = json!({
            "id": "u2i-abc",
            "created": 1700000000,
            "updated": 1700000100,
            "users": [
                {"id": 42, "name": "Shop"},
                {"id": 99, "name": "Ivan", "public_user_profile": {"avatar": {"default": "https://img/99"}}}
            ],
            "context": {"type": "item", "value": {"id": 123, "title": "Bike", "url": "https://avito.ru/123"}},
            "last_message": {"id": "m1", "author_id": 99, "created": 1700000100, "type": "text", "content": {"text": "hi"}}
        });
        let chat = remote_chat(&raw).unwrap();
        assert_eq!(chat.id, "u2i-abc");
        assert_eq!(chat.users.len(), 2);
        assert_eq!(chat.users[1].avatar.as_deref(), Some("https://img/99"));
        assert_eq!(chat.context.ad_id.as_deref(), Some("123"));
        assert_eq!(chat.context.ad_title.as_deref(), Some("Bike"));
        let last = chat.last_message.unwrap();
        assert_eq!(last.chat_id, "u2i-abc");
        assert_eq!(last.body, MessageBody::Text { text: "hi".into() });
    }

    #[test]
    fn malformed_last_message_is_dropped() {
        let raw = json!({"id": "c1", "last_message": {"content": {}}});
        let chat = remote_chat(&raw).unwrap();
        assert!(chat.last_message.is_none());
    }

    #[test]
    fn upload_prefers_large_size() {
        let raw = json!({"img-1": {"140x105": "https://s", "1280x960": "https://l"}});
        let media = uploaded_image(&raw).unwrap();
        assert_eq!(media.media_id, "img-1");
        assert_eq!(media.url.as_deref(), Some("https://l"));
        assert!(uploaded_image(&json!({})).is_err());
    }

    #[test]
    fn listing_shapes() {
        assert_eq!(list_of(&json!([1, 2]), "messages").len(), 2);
        assert_eq!(list_of(&json!({"messages": [1]}), "messages").len(), 1);
        assert!(list_of(&json!({"other": 1}), "messages").is_empty());
    }

    #[test]
    fn voice_lookup() {
        let raw = json!({"voices_urls": {"v1": "https://voice/v1"}});
        assert_eq!(voice_url(&raw, "v1").as_deref(), Some("https://voice/v1"));
        assert_eq!(voice_url(&raw, "v2"), None);
    }
}
