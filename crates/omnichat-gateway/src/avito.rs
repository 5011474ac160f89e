// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Avito routes: webhook intake, connection setup, history load and
//! read receipts.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use omnichat_core::types::{Identity, TenantId};
use omnichat_core::{ChannelType, OmnichatError};
use omnichat_ingest::IngestOutcome;
use omnichat_ingest::signature::AVITO_SIGNATURE_HEADER;
use omnichat_storage::queries::{channels, chats, messages};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::connect::{AvitoConnect, AvitoConnectRequest, AvitoConnection};
use crate::error::{ApiError, ApiResult};
use crate::handlers::client_for_chat;
use crate::server::GatewayState;

fn connector(state: &GatewayState) -> ApiResult<&Arc<AvitoConnect>> {
    state.avito.as_ref().ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "Not found").with_detail("avito is not configured")
    })
}

/// POST /chats/avito/webhooks/{tenant_id}
pub async fn webhook(
    State(state): State<GatewayState>,
    Path(tenant_id): Path<TenantId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IngestOutcome>> {
    let signature = headers
        .get(AVITO_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.ingestor.verify_signature(&body, signature) {
        warn!(tenant_id, "avito webhook signature mismatch");
        return Err(ApiError::unauthorized("invalid webhook signature"));
    }
    let outcome = state.ingestor.ingest(tenant_id, &body).await?;
    Ok(Json(outcome))
}

/// POST /chats/avito/connect
pub async fn connect(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<AvitoConnectRequest>,
) -> ApiResult<Json<AvitoConnection>> {
    let connection = connector(&state)?
        .connect(identity.tenant_id, request)
        .await?;
    Ok(Json(connection))
}

#[derive(Debug, Serialize)]
pub struct AuthorizeLink {
    pub url: String,
}

/// GET /chats/avito/oauth/authorize
pub async fn authorize(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<AuthorizeLink>> {
    let url = connector(&state)?.authorize_url(identity.tenant_id)?;
    Ok(Json(AuthorizeLink { url }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /chats/avito/oauth/callback
///
/// Public: the browser arrives here from the platform with `code` and the
/// tenant id in `state`.
pub async fn oauth_callback(
    State(state): State<GatewayState>,
    Query(params): Query<OAuthCallback>,
) -> ApiResult<Json<AvitoConnection>> {
    if let Some(error) = params.error {
        return Err(ApiError::bad_request(format!("authorization denied: {error}")));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("missing code"))?;
    let oauth_state = params
        .state
        .ok_or_else(|| ApiError::bad_request("missing state"))?;
    let connection = connector(&state)?
        .complete_oauth(&code, &oauth_state)
        .await?;
    Ok(Json(connection))
}

#[derive(Debug, Serialize)]
pub struct ConnectStatus {
    pub connected: bool,
    pub channel_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<String>,
}

/// GET /chats/avito/status
pub async fn status(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<ConnectStatus>> {
    let channel = channels::get_channel_by_type(&state.db, ChannelType::Avito)
        .await?
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "channel",
            id: ChannelType::Avito.to_string(),
        })?;
    match state.vault.load(channel.id, identity.tenant_id).await {
        Ok(view) => Ok(Json(ConnectStatus {
            connected: view.active,
            channel_id: channel.id,
            credential_id: Some(view.id),
            external_account_id: Some(view.external_account_id),
            token_expires_at: view.token_expires_at,
        })),
        Err(OmnichatError::VaultNotFound(_)) => Ok(Json(ConnectStatus {
            connected: false,
            channel_id: channel.id,
            credential_id: None,
            external_account_id: None,
            token_expires_at: None,
        })),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryLoad {
    /// Unix seconds; older chats and messages are skipped.
    #[serde(default)]
    pub since: Option<i64>,
    /// Run inline and return the summary instead of detaching.
    #[serde(default)]
    pub wait: bool,
}

/// POST /chats/avito/history/load
pub async fn load_history(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: HistoryLoad = if body.is_empty() {
        HistoryLoad::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };
    let tenant_id = identity.tenant_id;

    if request.wait {
        let summary = state
            .history
            .run(tenant_id, request.since, state.shutdown.child_token())
            .await?;
        return Ok(Json(summary).into_response());
    }

    let history = state.history.clone();
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        match history.run(tenant_id, request.since, cancel).await {
            Ok(summary) => info!(
                tenant_id,
                chats = summary.chats_processed,
                messages = summary.messages_created,
                errors = summary.errors.len(),
                "detached history load finished"
            ),
            Err(e) => warn!(tenant_id, error = %e, "detached history load failed"),
        }
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"accepted": true, "tenant_id": tenant_id})),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct MarkReadResult {
    pub success: bool,
    /// Whether the platform acknowledged the read.
    pub remote: bool,
    pub updated: usize,
}

/// POST /chats/avito/chats/{chat_id}/mark-read
pub async fn mark_read(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<MarkReadResult>> {
    let chat = chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    let client = client_for_chat(&state, &chat).await?;
    let remote = client.mark_read(&chat.external_chat_id).await?;

    let ids = messages::mark_chat_read(&state.db, chat.id).await?;
    for id in &ids {
        if let Some(message) = messages::get_message(&state.db, *id).await? {
            state.fanout.message(chat.tenant_id, &message);
        }
    }
    info!(chat_id, updated = ids.len(), remote, "chat marked read");
    Ok(Json(MarkReadResult {
        success: true,
        remote,
        updated: ids.len(),
    }))
}
