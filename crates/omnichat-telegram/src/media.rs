// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media plumbing for the bot API.
//!
//! Telegram file URLs embed the bot token, so files are mirrored into the
//! object store and exposed under the service's public URL instead.
//! Process-wide caches live here and are handed to clients explicitly.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use omnichat_core::{MediaStore, OmnichatError};
use tracing::debug;

/// How long a resolved avatar URL is reused.
pub const AVATAR_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// How long an album keeps pointing at its first message.
pub const MEDIA_GROUP_TTL: Duration = Duration::from_secs(10 * 60);

/// How long a staged upload waits for the matching send.
const UPLOAD_TTL: Duration = Duration::from_secs(10 * 60);

/// Bytes staged by `upload_media`, sent as multipart by `send_message`.
#[derive(Clone)]
pub struct PendingUpload {
    pub bytes: Arc<Vec<u8>>,
    pub filename: String,
    pub content_type: String,
}

impl std::fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUpload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Object-store access and caches shared by every Telegram client.
pub struct TelegramMedia {
    store: Arc<dyn MediaStore>,
    public_base_url: String,
    avatars: Cache<String, String>,
    uploads: Cache<String, PendingUpload>,
}

impl std::fmt::Debug for TelegramMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramMedia")
            .field("public_base_url", &self.public_base_url)
            .field("avatars", &self.avatars.entry_count())
            .finish_non_exhaustive()
    }
}

impl TelegramMedia {
    pub fn new(store: Arc<dyn MediaStore>, public_base_url: &str) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            avatars: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(AVATAR_TTL)
                .build(),
            uploads: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(UPLOAD_TTL)
                .build(),
        }
    }

    /// Write bytes to the object store and return their public URL.
    pub async fn publish(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, OmnichatError> {
        let size = bytes.len();
        let key = self.store.put(filename, bytes, content_type).await?;
        debug!(%key, size, "mirrored telegram file");
        Ok(omnichat_core::media::public_url(&self.public_base_url, &key))
    }

    pub(crate) async fn cached_avatar(&self, user_id: &str) -> Option<String> {
        self.avatars.get(user_id).await
    }

    pub(crate) async fn remember_avatar(&self, user_id: &str, url: &str) {
        self.avatars.insert(user_id.to_string(), url.to_string()).await;
    }

    /// Stage bytes for a later send and return the handle to send with.
    pub(crate) async fn stage(&self, upload: PendingUpload) -> String {
        let id = format!("upload-{}", uuid::Uuid::new_v4().simple());
        self.uploads.insert(id.clone(), upload).await;
        id
    }

    pub(crate) async fn take_staged(&self, id: &str) -> Option<PendingUpload> {
        self.uploads.remove(id).await
    }
}

/// Album tracking: photos sharing a `media_group_id` attach to the message
/// row created for the first of them.
#[derive(Clone)]
pub struct MediaGroups {
    inner: Cache<String, i64>,
}

impl std::fmt::Debug for MediaGroups {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaGroups")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl Default for MediaGroups {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaGroups {
    pub fn new() -> Self {
        Self::with_ttl(MEDIA_GROUP_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
        }
    }

    pub fn key(channel_id: i64, chat_id: &str, group_id: &str) -> String {
        format!("{channel_id}:{chat_id}:{group_id}")
    }

    pub async fn message_for(&self, key: &str) -> Option<i64> {
        self.inner.get(key).await
    }

    pub async fn remember(&self, key: String, message_id: i64) {
        self.inner.insert(key, message_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn media_groups_remember_first_message() {
        let groups = MediaGroups::new();
        let key = MediaGroups::key(1, "777", "album");
        assert_eq!(key, "1:777:album");
        assert_eq!(groups.message_for(&key).await, None);
        groups.remember(key.clone(), 42).await;
        assert_eq!(groups.message_for(&key).await, Some(42));
    }

    #[tokio::test]
    async fn media_groups_expire() {
        let groups = MediaGroups::with_ttl(Duration::from_millis(50));
        groups.remember("k".into(), 1).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(groups.message_for("k").await, None);
    }
}
