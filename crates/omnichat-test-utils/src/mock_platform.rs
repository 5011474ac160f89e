// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock platform client for deterministic testing.
//!
//! `MockPlatform` serves seeded chats and messages, captures everything sent
//! to it, and tracks how many calls are in flight at once so tests can
//! assert on concurrency bounds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::event::{MessageBody, MessageEvent};
use omnichat_core::types::{
    AdapterType, ChannelType, ChatListQuery, CredentialRef, HealthStatus, OutgoingMessage,
    PlatformProfile, RemoteChat, SentMessage, UploadedMedia,
};
use omnichat_core::{OmnichatError, PlatformClient, PlatformFactory, PluginAdapter};
use tokio::sync::Mutex;

/// Something the mock received through `upload_media`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub media_id: String,
    pub filename: String,
    pub len: usize,
}

/// Something the mock received through `send_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSend {
    pub chat_id: String,
    pub message: OutgoingMessage,
    pub external_message_id: String,
}

pub struct MockPlatform {
    channel_type: ChannelType,
    account_id: String,
    chats: Mutex<Vec<RemoteChat>>,
    messages: Mutex<HashMap<String, Vec<MessageEvent>>>,
    subscription_required: Mutex<HashSet<String>>,
    media_urls: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<RecordedSend>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    read: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
    deleted: Mutex<Vec<(String, String)>>,
    latency: Duration,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    message_pages: AtomicUsize,
}

impl MockPlatform {
    pub fn new(channel_type: ChannelType, account_id: &str) -> Self {
        Self {
            channel_type,
            account_id: account_id.to_string(),
            chats: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            subscription_required: Mutex::new(HashSet::new()),
            media_urls: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            read: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            fail_sends: AtomicBool::new(false),
            next_id: AtomicU64::new(1000),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            message_pages: AtomicUsize::new(0),
        }
    }

    /// Delay every `list_messages` call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn add_chat(&self, chat: RemoteChat, messages: Vec<MessageEvent>) {
        self.messages.lock().await.insert(chat.id.clone(), messages);
        self.chats.lock().await.push(chat);
    }

    /// Make `list_messages` for `chat_id` fail with `SubscriptionRequired`.
    pub async fn require_subscription(&self, chat_id: &str) {
        self.subscription_required
            .lock()
            .await
            .insert(chat_id.to_string());
    }

    pub async fn set_media_url(&self, media_id: &str, url: &str) {
        self.media_urls
            .lock()
            .await
            .insert(media_id.to_string(), url.to_string());
    }

    /// Make every `send_message` fail with a platform 500.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<RecordedSend> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().await.clone()
    }

    pub async fn read_chats(&self) -> Vec<String> {
        self.read.lock().await.clone()
    }

    pub async fn closed_chats(&self) -> Vec<String> {
        self.closed.lock().await.clone()
    }

    pub async fn deleted_messages(&self) -> Vec<(String, String)> {
        self.deleted.lock().await.clone()
    }

    /// Highest number of `list_messages` calls observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `list_messages` calls made so far.
    pub fn message_pages(&self) -> usize {
        self.message_pages.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

/// Decrements the in-flight counter when a call finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for MockPlatform {
    fn name(&self) -> &str {
        "mock-platform"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    async fn list_chats(&self, query: &ChatListQuery) -> Result<Vec<RemoteChat>, OmnichatError> {
        let chats = self.chats.lock().await;
        Ok(chats
            .iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageEvent>, OmnichatError> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.message_pages.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.subscription_required.lock().await.contains(chat_id) {
            return Err(OmnichatError::SubscriptionRequired {
                message: "messenger access requires a subscription".into(),
            });
        }
        let messages = self.messages.lock().await;
        Ok(messages
            .get(chat_id)
            .map(|all| {
                all.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, OmnichatError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(OmnichatError::Platform {
                status: 500,
                message: "mock send failure".into(),
            });
        }
        let external_message_id = self.next_id();
        self.sent.lock().await.push(RecordedSend {
            chat_id: chat_id.to_string(),
            message: message.clone(),
            external_message_id: external_message_id.clone(),
        });
        Ok(SentMessage {
            external_message_id,
        })
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedMedia, OmnichatError> {
        let media_id = format!("media-{}", self.next_id());
        self.uploads.lock().await.push(RecordedUpload {
            media_id: media_id.clone(),
            filename: filename.to_string(),
            len: bytes.len(),
        });
        Ok(UploadedMedia {
            media_id,
            url: None,
        })
    }

    async fn get_media_url(&self, media_id: &str) -> Result<Option<String>, OmnichatError> {
        Ok(self.media_urls.lock().await.get(media_id).cloned())
    }

    async fn mark_read(&self, chat_id: &str) -> Result<bool, OmnichatError> {
        self.read.lock().await.push(chat_id.to_string());
        Ok(true)
    }

    async fn get_self(&self) -> Result<PlatformProfile, OmnichatError> {
        Ok(PlatformProfile {
            external_account_id: self.account_id.clone(),
            display_name: Some("Mock account".into()),
            avatar: None,
        })
    }

    async fn register_webhook(&self, url: &str) -> Result<serde_json::Value, OmnichatError> {
        Ok(serde_json::json!({ "ok": true, "url": url }))
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<RemoteChat>, OmnichatError> {
        Ok(self
            .chats
            .lock()
            .await
            .iter()
            .find(|c| c.id == chat_id)
            .cloned())
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<bool, OmnichatError> {
        self.deleted
            .lock()
            .await
            .push((chat_id.to_string(), message_id.to_string()));
        Ok(true)
    }

    async fn close_chat(&self, chat_id: &str) -> Result<bool, OmnichatError> {
        self.closed.lock().await.push(chat_id.to_string());
        Ok(true)
    }
}

/// Hands out the same [`MockPlatform`] for every credential of a channel type.
#[derive(Default)]
pub struct MockPlatformFactory {
    platforms: HashMap<ChannelType, Arc<MockPlatform>>,
}

impl MockPlatformFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, platform: Arc<MockPlatform>) -> Self {
        self.platforms.insert(platform.channel_type, platform);
        self
    }
}

impl PlatformFactory for MockPlatformFactory {
    fn client_for(
        &self,
        credential: &CredentialRef,
    ) -> Result<Arc<dyn PlatformClient>, OmnichatError> {
        self.platforms
            .get(&credential.channel_type)
            .map(|p| p.clone() as Arc<dyn PlatformClient>)
            .ok_or_else(|| {
                OmnichatError::Config(format!("no mock platform for {}", credential.channel_type))
            })
    }
}

/// A text message as a platform would list it.
pub fn text_event(id: &str, chat_id: &str, author_id: &str, created: i64, text: &str) -> MessageEvent {
    MessageEvent {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        author_id: Some(author_id.to_string()),
        created,
        body: MessageBody::Text {
            text: text.to_string(),
        },
        ..MessageEvent::default()
    }
}

/// A remote chat with a creation time and optional newest message.
pub fn remote_chat(id: &str, created: i64, last_message: Option<MessageEvent>) -> RemoteChat {
    RemoteChat {
        id: id.to_string(),
        created: Some(created),
        updated: last_message.as_ref().map(|m| m.created).or(Some(created)),
        last_message,
        users: Vec::new(),
        context: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_respect_offset_and_limit() {
        let platform = MockPlatform::new(ChannelType::Avito, "42");
        for i in 0..5 {
            platform.add_chat(remote_chat(&format!("c{i}"), 1, None), vec![]).await;
        }
        let page = platform
            .list_chats(&ChatListQuery {
                limit: 2,
                offset: 3,
                ..ChatListQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c3", "c4"]);
    }

    #[tokio::test]
    async fn sends_are_recorded_in_order() {
        let platform = MockPlatform::new(ChannelType::Avito, "42");
        let first = platform
            .send_message("c1", &OutgoingMessage { text: Some("a".into()), image_id: None })
            .await
            .unwrap();
        let second = platform
            .send_message("c1", &OutgoingMessage { text: Some("b".into()), image_id: None })
            .await
            .unwrap();
        assert_ne!(first.external_message_id, second.external_message_id);
        let sent = platform.sent_messages().await;
        assert_eq!(sent[0].message.text.as_deref(), Some("a"));
        assert_eq!(sent[1].message.text.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn subscription_gate() {
        let platform = MockPlatform::new(ChannelType::Avito, "42");
        platform.add_chat(remote_chat("c1", 1, None), vec![]).await;
        platform.require_subscription("c1").await;
        assert!(matches!(
            platform.list_messages("c1", 100, 0).await,
            Err(OmnichatError::SubscriptionRequired { .. })
        ));
    }
}
