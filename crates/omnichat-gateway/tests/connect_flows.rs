// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel connection flows against mocked platform APIs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use omnichat_avito::AvitoFactory;
use omnichat_config::model::AvitoConfig;
use omnichat_gateway::{AvitoConnect, TelegramConnect, router};
use omnichat_ingest::TelegramUpdateHandler;
use omnichat_ingest::signature::TELEGRAM_SECRET_HEADER;
use omnichat_telegram::{MediaGroups, TelegramFactory, TelegramMedia};
use omnichat_test_utils::TestHarness;
use omnichat_test_utils::harness::PUBLIC_BASE_URL;
use omnichat_token::{OAuthTokenClient, TokenManager};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OTHER_TENANT: i64 = 2;

async fn avito_connect(h: &TestHarness, server: &MockServer) -> AvitoConnect {
    let endpoint = OAuthTokenClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let tokens = Arc::new(
        TokenManager::new(h.vault.clone()).with_endpoint(h.avito_channel_id, Arc::new(endpoint)),
    );
    let factory = AvitoFactory::new(&server.uri(), Duration::from_secs(5), tokens.clone()).unwrap();
    let config = AvitoConfig {
        client_id: Some("app-id".into()),
        client_secret: Some("app-secret".into()),
        redirect_uri: Some("https://chat.example.com/chats/avito/oauth/callback".into()),
        ..AvitoConfig::default()
    };
    AvitoConnect::new(factory, tokens, h.avito_channel_id, &config, PUBLIC_BASE_URL)
}

async fn mount_avito(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "refresh_token": "fresh-refresh",
            "expires_in": 86400,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/core/v1/accounts/self"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4242, "name": "Shop"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messenger/v3/webhook"))
        .and(body_partial_json(json!({
            "url": format!("{PUBLIC_BASE_URL}/chats/avito/webhooks/{OTHER_TENANT}"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn avito_connect_stores_credential_and_registers_webhook() {
    let h = TestHarness::new().await.unwrap();
    let server = MockServer::start().await;
    mount_avito(&server).await;

    let mut state = state(&h);
    state.avito = Some(Arc::new(avito_connect(&h, &server).await));
    let response = router(state)
        .oneshot(
            Request::post("/chats/avito/connect")
                .header("authorization", format!("Bearer {OTHER_TENANT_TOKEN}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["external_account_id"], "4242");
    assert_eq!(body["webhook_registered"], true);

    let view = h.vault.load(h.avito_channel_id, OTHER_TENANT).await.unwrap();
    assert_eq!(view.external_account_id, "4242");
    assert!(view.has_refresh_token());
}

#[tokio::test]
async fn oauth_callback_exchanges_the_code() {
    let h = TestHarness::new().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_avito(&server).await;

    let connect = avito_connect(&h, &server).await;
    let link = connect.authorize_url(OTHER_TENANT).unwrap();
    assert!(link.contains("state=2"));

    let mut state = state(&h);
    state.avito = Some(Arc::new(connect));
    let response = router(state)
        .oneshot(
            Request::get(format!("/chats/avito/oauth/callback?code=abc&state={OTHER_TENANT}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["tenant_id"], OTHER_TENANT);
    assert!(h.vault.load(h.avito_channel_id, OTHER_TENANT).await.is_ok());
}

async fn telegram_connect(h: &TestHarness, server: &MockServer, polling: bool) -> TelegramConnect {
    let tokens = Arc::new(TokenManager::new(h.vault.clone()));
    let media = Arc::new(TelegramMedia::new(h.media.clone(), PUBLIC_BASE_URL));
    let factory = TelegramFactory::new(&server.uri(), Duration::from_secs(5), tokens, media)
        .unwrap()
        .with_webhook_secret(Some("tg-secret".into()));
    let handler = Arc::new(TelegramUpdateHandler::new(h.router.clone(), MediaGroups::new()));
    TelegramConnect::new(factory, handler, h.telegram_channel_id, PUBLIC_BASE_URL)
        .with_polling(polling)
        .with_webhook_secret(Some("tg-secret".into()))
}

#[tokio::test]
async fn telegram_connect_sets_the_webhook() {
    let h = TestHarness::new().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot999:good/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 999, "is_bot": true, "username": "shop_bot"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot999:good/setWebhook"))
        .and(body_partial_json(json!({"secret_token": "tg-secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot999:bad/getMe"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized",
        })))
        .mount(&server)
        .await;

    let mut state = state(&h);
    state.telegram = Some(Arc::new(telegram_connect(&h, &server, false).await));
    let app = router(state);

    let response = app
        .clone()
        .oneshot(
            Request::post("/chats/telegram/connect")
                .header("authorization", format!("Bearer {OTHER_TENANT_TOKEN}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"bot_token": "999:bad"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::post("/chats/telegram/connect")
                .header("authorization", format!("Bearer {OTHER_TENANT_TOKEN}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"bot_token": "999:good"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["bot_id"], "999");
    assert_eq!(body["bot_username"], "shop_bot");
    let credential_id = body["credential_id"].as_i64().unwrap();
    assert_eq!(
        body["webhook_url"],
        format!("{PUBLIC_BASE_URL}/chats/telegram/webhook/{credential_id}")
    );
}

#[tokio::test]
async fn telegram_webhook_checks_the_secret() {
    let h = TestHarness::new().await.unwrap();
    let server = MockServer::start().await;
    let mut state = state(&h);
    state.telegram = Some(Arc::new(telegram_connect(&h, &server, true).await));
    let app = router(state);
    let credential_id = h.telegram_credential.credential_id;
    let update = json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "from": {"id": 777, "first_name": "Ann"},
            "chat": {"id": 777, "type": "private"},
            "date": 1_700_000_000,
            "text": "hi bot",
        },
    });

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/chats/telegram/webhook/{credential_id}"))
                .header("content-type", "application/json")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/chats/telegram/webhook/{credential_id}"))
                .header(TELEGRAM_SECRET_HEADER, "tg-secret")
                .header("content-type", "application/json")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["result"], "created");

    let response = app
        .oneshot(
            Request::post("/chats/telegram/webhook/999999")
                .header(TELEGRAM_SECRET_HEADER, "tg-secret")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
