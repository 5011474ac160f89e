// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator sends end to end: persistence, platform dispatch, fanout, bus.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use omnichat_core::types::{
    Chat, ChannelType, MessageSource, MessageStatus, MessageType, NewChat, SenderType,
};
use omnichat_core::{OmnichatError, PlatformRegistry};
use omnichat_outbound::{MediaFetcher, OutboundSender, SendRequest};
use omnichat_storage::queries::{chats, messages, pictures};
use omnichat_telegram::{TelegramFactory, TelegramMedia};
use omnichat_test_utils::TestHarness;
use omnichat_test_utils::harness::{PUBLIC_BASE_URL, TENANT};
use omnichat_token::TokenManager;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn chat_on(h: &TestHarness, channel_id: i64, external: &str) -> Chat {
    chats::get_or_create_chat(
        &h.db,
        &NewChat {
            channel_id,
            tenant_id: TENANT,
            external_chat_id: external.to_string(),
            ..NewChat::default()
        },
    )
    .await
    .unwrap()
    .chat
}

fn png_data_url(len: usize) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(vec![7u8; len]))
}

#[tokio::test]
async fn telegram_text_send_is_delivered_with_platform_id() {
    let h = TestHarness::new().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({"chat_id": "777", "text": "hi"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true, "result": {"message_id": 555}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let media = Arc::new(TelegramMedia::new(h.media.clone(), PUBLIC_BASE_URL));
    let tokens = Arc::new(TokenManager::new(h.vault.clone()));
    let telegram =
        TelegramFactory::new(&server.uri(), Duration::from_secs(5), tokens, media).unwrap();
    let registry = PlatformRegistry::new().register(ChannelType::Telegram, Arc::new(telegram));
    let sender = OutboundSender::new(
        h.db.clone(),
        h.vault.clone(),
        Arc::new(registry),
        h.media.clone(),
        MediaFetcher::new(Duration::from_secs(5), 1024).unwrap(),
        h.fanout.clone(),
        h.message_bus.clone(),
        PUBLIC_BASE_URL,
    );

    let chat = chat_on(&h, h.telegram_channel_id, "777").await;
    let (_id, mut chat_rx) = h.fanout.chats().connect(chat.id, 7);
    let sent = sender
        .send(SendRequest::new(chat.id, TENANT).text("hi").user(7))
        .await
        .unwrap();

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, MessageStatus::Delivered);
    assert_eq!(sent[0].external_message_id.as_deref(), Some("555"));
    assert_eq!(sent[0].sender_type, SenderType::Operator);
    assert_eq!(sent[0].source, MessageSource::Api);

    let stored = messages::get_message(&h.db, sent[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);
    assert_eq!(stored.external_message_id.as_deref(), Some("555"));

    let frame: Value = serde_json::from_str(&chat_rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["status"], "DELIVERED");

    let published = h.bus.on("chat.messages").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["channel_type"], "TELEGRAM");
    assert_eq!(published[0]["user_id"], 7);
}

#[tokio::test]
async fn text_with_image_sends_image_first() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;

    let sent = h
        .sender
        .send(
            SendRequest::new(chat.id, TENANT)
                .text("see photo")
                .media_url(png_data_url(10)),
        )
        .await
        .unwrap();

    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message_type, MessageType::Image);
    assert_eq!(sent[1].message_type, MessageType::Text);
    assert_eq!(sent[1].content, "see photo");
    assert!(sent.iter().all(|m| m.status == MessageStatus::Delivered));
    assert!(sent[0].content.starts_with("https://chat.example.com/api/v1/photos/test/"));

    let platform_sends = h.avito.sent_messages().await;
    assert_eq!(platform_sends.len(), 2);
    assert!(platform_sends[0].message.image_id.is_some());
    assert_eq!(platform_sends[1].message.text.as_deref(), Some("see photo"));
    assert_eq!(
        sent[0].external_message_id.as_deref(),
        Some(platform_sends[0].external_message_id.as_str())
    );

    let uploads = h.avito.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].len, 10);
    assert_eq!(uploads[0].filename, "image.png");
    assert_eq!(h.media.len().await, 1);

    let attached = pictures::list_for_message(&h.db, sent[0].id).await.unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].url, sent[0].content);

    let published = h.bus.on("chat.messages").await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0]["message_type"], "IMAGE");
    assert_eq!(published[1]["message_type"], "TEXT");
}

#[tokio::test]
async fn oversized_image_fails_without_platform_call() {
    let h = TestHarness::builder()
        .with_max_media_bytes(8)
        .build()
        .await
        .unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;

    let sent = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).media_url(png_data_url(10)))
        .await
        .unwrap();

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, MessageStatus::Failed);
    assert_eq!(sent[0].external_message_id, None);
    assert_eq!(h.avito.sent_count().await, 0);
    assert!(h.avito.uploads().await.is_empty());
    assert!(h.media.is_empty().await);
}

#[tokio::test]
async fn repeated_text_within_window_is_rejected() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;
    let (_id, mut chat_rx) = h.fanout.chats().connect(chat.id, 7);

    h.sender
        .send(SendRequest::new(chat.id, TENANT).text("on my way"))
        .await
        .unwrap();
    while chat_rx.try_recv().is_ok() {}

    let err = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).text("  on my way "))
        .await
        .unwrap_err();
    assert!(matches!(err, OmnichatError::DuplicateMessage { chat_id } if chat_id == chat.id));

    let frame: Value = serde_json::from_str(&chat_rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "duplicate_message");
    assert_eq!(frame["content"], "on my way");
    assert_eq!(messages::list_messages(&h.db, chat.id, 10, 0).await.unwrap().len(), 1);
    assert_eq!(h.avito.sent_count().await, 1);
}

#[tokio::test]
async fn repeat_after_window_is_sent() {
    let h = TestHarness::builder()
        .with_dedup_window(Duration::ZERO)
        .build()
        .await
        .unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;
    h.sender
        .send(SendRequest::new(chat.id, TENANT).text("ok"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.sender
        .send(SendRequest::new(chat.id, TENANT).text("ok"))
        .await
        .unwrap();
    assert_eq!(h.avito.sent_count().await, 2);
}

#[tokio::test]
async fn platform_failure_marks_row_failed() {
    let h = TestHarness::new().await.unwrap();
    h.avito.fail_sends(true);
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;

    let sent = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).text("hello"))
        .await
        .unwrap();
    assert_eq!(sent[0].status, MessageStatus::Failed);
    let stored = messages::get_message(&h.db, sent[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Failed);
    assert_eq!(h.bus.on("chat.messages").await.len(), 1);
}

#[tokio::test]
async fn other_tenants_chat_is_denied() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;
    let err = h
        .sender
        .send(SendRequest::new(chat.id, TENANT + 1).text("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);
    assert_eq!(h.avito.sent_count().await, 0);
}

#[tokio::test]
async fn empty_request_is_invalid() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;
    let err = h
        .sender
        .send(SendRequest::new(chat.id, TENANT))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn different_image_after_failed_image_is_sent() {
    let h = TestHarness::builder()
        .with_max_media_bytes(8)
        .build()
        .await
        .unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;

    let failed = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).media_url(png_data_url(10)))
        .await
        .unwrap();
    assert_eq!(failed[0].status, MessageStatus::Failed);
    assert_eq!(failed[0].content, "[Image]");

    let sent = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).media_url(png_data_url(5)))
        .await
        .unwrap();
    assert_eq!(sent[0].status, MessageStatus::Delivered);
    assert_eq!(h.avito.uploads().await.len(), 1);
}

#[tokio::test]
async fn same_image_twice_is_rejected() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;
    let image = png_data_url(6);

    h.sender
        .send(SendRequest::new(chat.id, TENANT).media_url(image.clone()))
        .await
        .unwrap();
    let err = h
        .sender
        .send(SendRequest::new(chat.id, TENANT).media_url(image))
        .await
        .unwrap_err();
    assert!(matches!(err, OmnichatError::DuplicateMessage { .. }));
    assert_eq!(h.avito.uploads().await.len(), 1);
}

#[tokio::test]
async fn concurrent_identical_sends_store_and_send_once() {
    let h = TestHarness::new().await.unwrap();
    let chat = chat_on(&h, h.avito_channel_id, "c1").await;

    let (a, b) = tokio::join!(
        h.sender.send(SendRequest::new(chat.id, TENANT).text("hello")),
        h.sender.send(SendRequest::new(chat.id, TENANT).text("hello")),
    );

    let stored: Vec<_> = [&a, &b].into_iter().filter(|r| r.is_ok()).collect();
    assert_eq!(stored.len(), 1, "exactly one send wins: {a:?} {b:?}");
    assert!(
        [a, b]
            .into_iter()
            .any(|r| matches!(r, Err(OmnichatError::DuplicateMessage { .. })))
    );
    assert_eq!(messages::list_messages(&h.db, chat.id, 10, 0).await.unwrap().len(), 1);
    assert_eq!(h.avito.sent_count().await, 1);
}
