// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the workspace.
//!
//! Row types mirror the SQLite schema in `omnichat-storage`. Timestamps are
//! RFC 3339 UTC strings produced by [`crate::time`], so they sort
//! lexicographically.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Business account that owns channel state.
pub type TenantId = i64;

/// Categories of pluggable collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    Platform,
    Storage,
    Bus,
    Identity,
    MediaStore,
}

/// Health status reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Avito,
    Telegram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Client,
    Operator,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Voice,
    Video,
    Document,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Deleted,
}

/// Where a message row originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Webhook,
    Web,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatStatus {
    Active,
    Closed,
}

/// One platform integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub channel_type: ChannelType,
    pub name: String,
    pub active: bool,
    pub created_at: String,
}

/// Credential row as persisted. Secret fields hold vault ciphertext.
#[derive(Clone, PartialEq)]
pub struct StoredCredential {
    pub id: i64,
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: Option<String>,
    pub external_account_id: String,
    pub redirect_uri: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("tenant_id", &self.tenant_id)
            .field("token_expires_at", &self.token_expires_at)
            .field("external_account_id", &self.external_account_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Everything a platform client needs to act for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub credential_id: i64,
    pub channel_id: i64,
    pub channel_type: ChannelType,
    pub tenant_id: TenantId,
    pub external_account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub external_chat_id: String,
    pub contact_id: Option<i64>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub metadata: serde_json::Value,
    pub first_message_time: Option<String>,
    pub last_message_time: Option<String>,
    pub first_response_time_seconds: Option<i64>,
    pub last_response_time_seconds: Option<i64>,
    pub status: ChatStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for creating a chat. Hints are applied only where the row is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewChat {
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub external_chat_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatContact {
    pub id: i64,
    pub channel_id: i64,
    pub external_contact_id: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub external_message_id: Option<String>,
    pub status: MessageStatus,
    pub source: MessageSource,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub chat_id: i64,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub external_message_id: Option<String>,
    pub status: MessageStatus,
    pub source: MessageSource,
    /// Original event time; defaults to now.
    pub created_at: Option<String>,
}

/// Attachment link between a message and a stored or remote URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    pub id: i64,
    pub message_id: i64,
    pub url: String,
    pub size: Option<i64>,
    pub is_main: bool,
    pub owner_tenant_id: TenantId,
    pub created_at: String,
}

/// Authenticated operator as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub name: Option<String>,
}

/// A participant reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

/// Listing context attached to a platform chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub ad_title: Option<String>,
    pub ad_id: Option<String>,
    pub ad_url: Option<String>,
    pub raw: Option<serde_json::Value>,
}

impl ChatContext {
    /// Metadata keys written onto the local chat row.
    pub fn to_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        if let Some(v) = &self.ad_title {
            map.insert("ad_title".into(), v.clone().into());
        }
        if let Some(v) = &self.ad_id {
            map.insert("ad_id".into(), v.clone().into());
        }
        if let Some(v) = &self.ad_url {
            map.insert("ad_url".into(), v.clone().into());
        }
        if let Some(v) = &self.raw {
            map.insert("context".into(), v.clone());
        }
        map
    }
}

/// Parameters for one page of `list_chats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListQuery {
    pub limit: u32,
    pub offset: u32,
    pub chat_types: Vec<String>,
    pub unread_only: bool,
}

impl Default for ChatListQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            chat_types: Vec::new(),
            unread_only: false,
        }
    }
}

/// A chat as listed by the platform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteChat {
    pub id: String,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    pub last_message: Option<crate::event::MessageEvent>,
    pub users: Vec<RemoteUser>,
    pub context: ChatContext,
}

/// Outgoing payload. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub external_message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedMedia {
    pub media_id: String,
    pub url: Option<String>,
}

/// The account a credential acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub external_account_id: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}
