// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot API contract tests against a mock server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::types::{AdapterType, ChannelType, CredentialRef, HealthStatus, OutgoingMessage};
use omnichat_core::{MediaStore, OmnichatError, PlatformClient, PluginAdapter};
use omnichat_storage::Database;
use omnichat_storage::queries::channels;
use omnichat_telegram::polling::poll_bot;
use omnichat_telegram::{
    PollSettings, PollingSupervisor, TelegramClient, TelegramFactory, TelegramMedia, UpdateHandler,
};
use omnichat_token::TokenManager;
use omnichat_vault::{CredentialPatch, Vault};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[derive(Default)]
struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaStore
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn put(&self, filename: &str, bytes: Vec<u8>, _ct: &str) -> Result<String, OmnichatError> {
        let key = format!("test/{filename}");
        self.blobs.lock().unwrap().insert(key.clone(), bytes);
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, OmnichatError> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }
}

struct Setup {
    factory: TelegramFactory,
    store: Arc<MemoryStore>,
    credential: CredentialRef,
    channel_id: i64,
}

async fn setup(server: &MockServer) -> Setup {
    let db = Database::open(":memory:").await.unwrap();
    let channel = channels::ensure_channel(&db, ChannelType::Telegram, "Telegram")
        .await
        .unwrap();
    let vault = Arc::new(Vault::with_key(db, Zeroizing::new([3u8; 32])).await.unwrap());
    let cred = vault
        .save(CredentialPatch {
            channel_id: channel.id,
            tenant_id: 1,
            external_account_id: "555000".into(),
            access_token: Some("123:abc".into()),
            ..CredentialPatch::default()
        })
        .await
        .unwrap();
    let store = Arc::new(MemoryStore::default());
    let media = Arc::new(TelegramMedia::new(store.clone(), "https://chat.example.com/"));
    let tokens = Arc::new(TokenManager::new(vault));
    let factory = TelegramFactory::new(&server.uri(), Duration::from_secs(5), tokens, media)
        .unwrap()
        .with_webhook_secret(Some("hook-secret".into()));
    Setup {
        factory,
        store,
        credential: CredentialRef {
            credential_id: cred.id,
            channel_id: channel.id,
            channel_type: ChannelType::Telegram,
            tenant_id: 1,
            external_account_id: "555000".into(),
        },
        channel_id: channel.id,
    }
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

#[tokio::test]
async fn send_text_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({"chat_id": "777", "text": "hello"})))
        .respond_with(ok(json!({"message_id": 555})))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let sent = s
        .factory
        .client(&s.credential)
        .send_message(
            "777",
            &OutgoingMessage {
                text: Some("hello".into()),
                image_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(sent.external_message_id, "555");
}

#[tokio::test]
async fn staged_upload_is_sent_as_multipart_photo_with_caption() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendPhoto"))
        .and(body_string_contains("name=\"photo\""))
        .and(body_string_contains("look at this"))
        .respond_with(ok(json!({"message_id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let client = s.factory.client(&s.credential);
    let uploaded = client.upload_media(PNG.to_vec(), "pic.png").await.unwrap();
    assert!(uploaded.media_id.starts_with("upload-"));
    assert_eq!(uploaded.url, None);

    let sent = client
        .send_message(
            "777",
            &OutgoingMessage {
                text: Some("look at this".into()),
                image_id: Some(uploaded.media_id),
            },
        )
        .await
        .unwrap();
    assert_eq!(sent.external_message_id, "9");
}

#[tokio::test]
async fn empty_message_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    let s = setup(&server).await;
    let err = s
        .factory
        .client(&s.credential)
        .send_message("777", &OutgoingMessage::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OmnichatError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn media_url_mirrors_file_into_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getFile"))
        .and(body_partial_json(json!({"file_id": "F1"})))
        .respond_with(ok(json!({"file_id": "F1", "file_path": "photos/file_1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file/bot123:abc/photos/file_1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let url = s
        .factory
        .client(&s.credential)
        .get_media_url("F1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(url, "https://chat.example.com/api/v1/photos/test/file_1.png");
    assert_eq!(
        s.store.get("test/file_1.png").await.unwrap().as_deref(),
        Some(PNG)
    );
}

#[tokio::test]
async fn avatar_is_resolved_once_then_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getUserProfilePhotos"))
        .respond_with(ok(json!({
            "total_count": 1,
            "photos": [[
                {"file_id": "small", "width": 160, "height": 160, "file_size": 100},
                {"file_id": "big", "width": 640, "height": 640, "file_size": 900}
            ]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getFile"))
        .and(body_partial_json(json!({"file_id": "big"})))
        .respond_with(ok(json!({"file_path": "profile_photos/big.jpg"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file/bot123:abc/profile_photos/big.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let client = s.factory.client(&s.credential);
    let first = client.avatar_url("42").await.unwrap();
    let second = client.avatar_url("42").await.unwrap();
    assert_eq!(first, second);
    assert!(first.ends_with("/api/v1/photos/test/big.jpg"));
}

#[tokio::test]
async fn missing_avatar_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getUserProfilePhotos"))
        .respond_with(ok(json!({"total_count": 0, "photos": []})))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    assert_eq!(s.factory.client(&s.credential).avatar_url("42").await, None);
}

#[tokio::test]
async fn get_self_reads_bot_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getMe"))
        .respond_with(ok(json!({"id": 555000, "is_bot": true, "first_name": "Shop", "username": "shop_bot"})))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let profile = s.factory.client(&s.credential).get_self().await.unwrap();
    assert_eq!(profile.external_account_id, "555000");
    assert_eq!(profile.display_name.as_deref(), Some("shop_bot"));
}

#[tokio::test]
async fn profile_for_unsaved_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot999:new/getMe"))
        .respond_with(ok(json!({"id": 999, "is_bot": true, "first_name": "Fresh"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot999:bad/getMe"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
        )
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let profile = s.factory.profile_for_token("999:new").await.unwrap();
    assert_eq!(profile.external_account_id, "999");
    assert_eq!(profile.display_name.as_deref(), Some("Fresh"));
    assert!(s.factory.profile_for_token("999:bad").await.is_err());
}

#[tokio::test]
async fn webhook_registration_carries_secret_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/setWebhook"))
        .and(body_partial_json(json!({
            "url": "https://chat.example.com/chats/telegram/webhooks/1",
            "secret_token": "hook-secret",
            "allowed_updates": ["message", "edited_message", "callback_query"]
        })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let result = s
        .factory
        .client(&s.credential)
        .register_webhook("https://chat.example.com/chats/telegram/webhooks/1")
        .await
        .unwrap();
    assert_eq!(result, json!(true));
}

#[tokio::test]
async fn api_refusal_is_platform_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let err = s
        .factory
        .client(&s.credential)
        .send_message(
            "777",
            &OutgoingMessage {
                text: Some("hi".into()),
                image_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OmnichatError::Platform { status: 403, .. }));
}

#[tokio::test]
async fn unauthorized_bot_token_is_expired_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getMe"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false, "error_code": 401, "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let err = s.factory.client(&s.credential).get_me().await.unwrap_err();
    assert!(matches!(err, OmnichatError::TokenExpired { .. }), "{err:?}");
}

#[tokio::test]
async fn missing_chat_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getChat"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false, "error_code": 400, "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let chat = s.factory.client(&s.credential).get_chat("1").await.unwrap();
    assert!(chat.is_none());
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<Value>>,
}

#[async_trait]
impl UpdateHandler for Recorder {
    async fn handle_update(
        &self,
        _client: &TelegramClient,
        update: Value,
    ) -> Result<(), OmnichatError> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

#[tokio::test]
async fn poller_advances_offset_past_handled_updates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/deleteWebhook"))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getUpdates"))
        .and(body_partial_json(json!({"offset": 12})))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getUpdates"))
        .respond_with(ok(json!([
            {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 7}, "text": "a"}},
            {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 7}, "text": "b"}}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let recorder = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poll_bot(
        s.factory.client(&s.credential),
        recorder.clone(),
        PollSettings {
            poll_timeout_secs: 0,
            ..PollSettings::default()
        },
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    let offset = task.await.unwrap();
    assert_eq!(offset, Some(12));
    assert_eq!(recorder.updates.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn supervisor_follows_active_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let s = setup(&server).await;
    let cancel = CancellationToken::new();
    let mut supervisor = PollingSupervisor::new(
        s.factory.clone(),
        s.channel_id,
        Arc::new(Recorder::default()),
        PollSettings {
            poll_timeout_secs: 0,
            ..PollSettings::default()
        },
    );

    supervisor.sync_once(&cancel).await.unwrap();
    assert_eq!(supervisor.polled(), vec![s.credential.credential_id]);

    s.factory
        .tokens()
        .vault()
        .deactivate(s.channel_id, 1)
        .await
        .unwrap();
    supervisor.sync_once(&cancel).await.unwrap();
    assert!(supervisor.polled().is_empty());
    cancel.cancel();
}
