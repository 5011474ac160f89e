// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-facing models.
//!
//! Row types shared across crates live in `omnichat-core::types` and are
//! re-exported here. Query inputs and aggregate results that only the
//! storage layer produces are defined in this module.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use omnichat_core::types::{
    Channel, Chat, ChatContact, ChatMessage, NewChat, NewMessage, Picture, StoredCredential,
};
use omnichat_core::types::{ChatStatus, MessageStatus, TenantId};

/// Credential fields to insert or update. Secret fields must already be
/// vault ciphertext.
#[derive(Clone, Default, PartialEq)]
pub struct CredentialWrite {
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub external_account_id: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for CredentialWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialWrite")
            .field("channel_id", &self.channel_id)
            .field("tenant_id", &self.tenant_id)
            .field("external_account_id", &self.external_account_id)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of an idempotent message insert.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInsert {
    pub message: ChatMessage,
    /// `false` when a row with the same external id already existed.
    pub created: bool,
}

/// An operator message and the key repeats are detected on.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDraft {
    pub message: NewMessage,
    pub dedup_key: String,
}

/// Result of [`crate::queries::messages::create_unless_duplicate`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorInsert {
    /// Every draft was stored, in order.
    Created(Vec<ChatMessage>),
    /// Draft `index` repeats `previous`; nothing was stored.
    Duplicate { index: usize, previous: ChatMessage },
}

/// Result of [`crate::queries::chats::get_or_create_chat`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpsert {
    pub chat: Chat,
    pub created: bool,
    /// Some hint or metadata key was written onto an existing row.
    pub updated: bool,
}

/// Fields that may change on an existing message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageUpdate {
    pub status: Option<MessageStatus>,
    pub external_message_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatSort {
    CreatedAt,
    #[default]
    UpdatedAt,
    LastMessageTime,
    Name,
}

impl ChatSort {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "c.created_at",
            Self::UpdatedAt => "c.updated_at",
            Self::LastMessageTime => "c.last_message_time",
            Self::Name => "c.name COLLATE NOCASE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Tenant-scoped chat listing filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatFilter {
    pub tenant_id: TenantId,
    pub channel_id: Option<i64>,
    pub status: Option<ChatStatus>,
    /// Substring of name, phone or external chat id.
    pub search: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub sort_by: ChatSort,
    pub sort_order: SortOrder,
    pub skip: u32,
    pub limit: u32,
}

impl ChatFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            channel_id: None,
            status: None,
            search: None,
            created_from: None,
            created_to: None,
            sort_by: ChatSort::default(),
            sort_order: SortOrder::default(),
            skip: 0,
            limit: 100,
        }
    }
}

/// A chat row with listing extras.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    /// First 100 characters of the newest message.
    pub last_message_preview: Option<String>,
    /// CLIENT messages not yet READ.
    pub unread_count: i64,
}
