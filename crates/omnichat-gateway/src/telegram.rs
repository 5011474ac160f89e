// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram routes: bot connection, status and webhook delivery.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use omnichat_core::types::Identity;
use omnichat_ingest::IngestOutcome;
use omnichat_ingest::signature::{TELEGRAM_SECRET_HEADER, verify_secret_token};
use serde_json::Value;
use tracing::warn;

use crate::connect::{TelegramConnect, TelegramConnectRequest, TelegramConnection};
use crate::error::{ApiError, ApiResult};
use crate::server::GatewayState;

fn connector(state: &GatewayState) -> ApiResult<&Arc<TelegramConnect>> {
    state.telegram.as_ref().ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "Not found").with_detail("telegram is not configured")
    })
}

/// POST /chats/telegram/connect
pub async fn connect(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<TelegramConnectRequest>,
) -> ApiResult<Json<TelegramConnection>> {
    let telegram = connector(&state)?;
    let bot_token = request.bot_token.trim();
    if bot_token.is_empty() {
        return Err(ApiError::bad_request("bot_token is required"));
    }
    let (bot_id, bot_username) = telegram
        .verify(bot_token)
        .await
        .map_err(|e| ApiError::unauthorized(format!("bot token rejected: {e}")))?;
    let connection = telegram
        .connect(identity.tenant_id, bot_token, bot_id, bot_username)
        .await?;
    Ok(Json(connection))
}

/// GET /chats/telegram/status
pub async fn status(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Value>> {
    Ok(Json(connector(&state)?.status(identity.tenant_id).await?))
}

/// POST /chats/telegram/webhook/{credential_id}
pub async fn webhook(
    State(state): State<GatewayState>,
    Path(credential_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IngestOutcome>> {
    let telegram = connector(&state)?;
    let presented = headers
        .get(TELEGRAM_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !verify_secret_token(telegram.webhook_secret(), presented) {
        warn!(credential_id, "telegram webhook secret mismatch");
        return Err(ApiError::forbidden("invalid secret token"));
    }
    let update: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(telegram.webhook(credential_id, &update).await?))
}
