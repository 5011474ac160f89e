// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Uniform operation set over remote messenger platforms.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OmnichatError;
use crate::event::MessageEvent;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelType, ChatListQuery, CredentialRef, OutgoingMessage, PlatformProfile, RemoteChat,
    SentMessage, UploadedMedia,
};

/// Largest media payload accepted by any platform, in bytes.
pub const MAX_MEDIA_BYTES: usize = 24 * 1024 * 1024;

/// A platform client bound to one credential.
///
/// Every call obtains its token through the token manager. A 401 triggers
/// one refresh-and-retry; other non-2xx responses surface as
/// [`OmnichatError::Platform`], and subscription failures as
/// [`OmnichatError::SubscriptionRequired`].
#[async_trait]
pub trait PlatformClient: PluginAdapter {
    fn channel_type(&self) -> ChannelType;

    /// One page of chats, ordered as the platform returns them.
    async fn list_chats(&self, query: &ChatListQuery) -> Result<Vec<RemoteChat>, OmnichatError>;

    /// One page of messages, newest first.
    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageEvent>, OmnichatError>;

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, OmnichatError>;

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedMedia, OmnichatError>;

    async fn get_media_url(&self, media_id: &str) -> Result<Option<String>, OmnichatError>;

    async fn mark_read(&self, chat_id: &str) -> Result<bool, OmnichatError>;

    async fn get_self(&self) -> Result<PlatformProfile, OmnichatError>;

    async fn register_webhook(&self, url: &str) -> Result<serde_json::Value, OmnichatError>;

    /// Single chat lookup, used to harvest participant details.
    async fn get_chat(&self, chat_id: &str) -> Result<Option<RemoteChat>, OmnichatError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str)
    -> Result<bool, OmnichatError>;

    async fn close_chat(&self, chat_id: &str) -> Result<bool, OmnichatError>;
}

/// Builds platform clients for stored credentials.
pub trait PlatformFactory: Send + Sync + 'static {
    fn client_for(&self, credential: &CredentialRef)
    -> Result<Arc<dyn PlatformClient>, OmnichatError>;
}

/// Dispatches [`PlatformFactory::client_for`] by channel type.
#[derive(Default)]
pub struct PlatformRegistry {
    factories: HashMap<ChannelType, Arc<dyn PlatformFactory>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, channel_type: ChannelType, factory: Arc<dyn PlatformFactory>) -> Self {
        self.factories.insert(channel_type, factory);
        self
    }

    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.factories.contains_key(&channel_type)
    }
}

impl PlatformFactory for PlatformRegistry {
    fn client_for(
        &self,
        credential: &CredentialRef,
    ) -> Result<Arc<dyn PlatformClient>, OmnichatError> {
        self.factories
            .get(&credential.channel_type)
            .ok_or_else(|| {
                OmnichatError::Config(format!(
                    "no platform client registered for {}",
                    credential.channel_type
                ))
            })?
            .client_for(credential)
    }
}
