// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway state over the shared test harness.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use omnichat_core::PlatformFactory;
use omnichat_core::types::Chat;
use omnichat_gateway::{GatewayState, router};
use omnichat_ingest::IngestOutcome;
use omnichat_storage::queries::chats;
use omnichat_sync::{HistorySync, SyncSettings};
use omnichat_test_utils::harness::{PUBLIC_BASE_URL, TENANT};
use omnichat_test_utils::{StaticIdentity, TestHarness};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub const TOKEN: &str = "op-token";
pub const OTHER_TENANT_TOKEN: &str = "other-token";
pub const OPERATOR_ID: i64 = 7;

pub const HELLO: &[u8] = br#"{"id":"w1","version":"v3.0.0","timestamp":1700000000,"payload":{"type":"message","value":{"id":"m1","chat_id":"c1","user_id":42,"author_id":99,"created":1700000000,"type":"text","content":{"text":"hello there"}}}}"#;

pub fn state(h: &TestHarness) -> GatewayState {
    let platforms: Arc<dyn PlatformFactory> = h.platforms.clone();
    let history = HistorySync::new(
        h.router.clone(),
        h.vault.clone(),
        platforms.clone(),
        SyncSettings::default(),
    );
    GatewayState {
        db: h.db.clone(),
        vault: h.vault.clone(),
        platforms,
        identity: Arc::new(
            StaticIdentity::new()
                .with(TOKEN, OPERATOR_ID, TENANT)
                .with(OTHER_TENANT_TOKEN, 8, TENANT + 1),
        ),
        fanout: h.fanout.clone(),
        bus: h.message_bus.clone(),
        ingestor: h.ingestor.clone(),
        sender: h.sender.clone(),
        history: Arc::new(history),
        media: h.media.clone(),
        public_base_url: PUBLIC_BASE_URL.to_string(),
        avito: None,
        telegram: None,
        started_at: Instant::now(),
        shutdown: CancellationToken::new(),
    }
}

pub fn app(h: &TestHarness) -> Router {
    router(state(h))
}

/// Ingest the canned webhook and return the chat it created.
pub async fn seeded_chat(h: &TestHarness) -> Chat {
    let outcome = h.ingestor.ingest(TENANT, HELLO).await.unwrap();
    let IngestOutcome::Created { chat_id, .. } = outcome else {
        panic!("expected a created message, got {outcome:?}");
    };
    chats::get_chat(&h.db, chat_id).await.unwrap().unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
