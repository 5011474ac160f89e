// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator REST handlers for channels, chats, messages and files.

use std::str::FromStr;
use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use omnichat_core::media::infer_content_type;
use omnichat_core::types::{Channel, Chat, ChatMessage, HealthStatus, Identity, Picture};
use omnichat_core::{
    ChatStatus, MessageSource, MessageStatus, MessageType, OmnichatError, PlatformClient,
    PluginAdapter,
};
use omnichat_ingest::normalize_phone;
use omnichat_outbound::SendRequest;
use omnichat_storage::queries::{channels, chats, contacts, messages, pictures};
use omnichat_storage::{ChatFilter, ChatSort, ChatSummary, MessageUpdate, SortOrder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::server::GatewayState;

/// Upper bound for `limit` on listing routes.
pub const MAX_PAGE: u32 = 1000;

fn health_label(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded(reason) => format!("degraded: {reason}"),
        HealthStatus::Unhealthy(reason) => format!("unhealthy: {reason}"),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: String,
    pub bus: String,
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Response {
    let database = match state.db.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    let bus = state.bus.health().await;

    let healthy = database == HealthStatus::Healthy
        && !matches!(bus, Some(HealthStatus::Unhealthy(_)));
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        database: health_label(&database),
        bus: bus.as_ref().map_or_else(|| "disabled".to_string(), health_label),
    };
    let code = if database == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// GET /api/v1/photos/{*key}
pub async fn photo(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    if key.split('/').any(|part| part == "..") {
        return Err(ApiError::bad_request("invalid media key"));
    }
    let bytes = state
        .media
        .get(&key)
        .await?
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "media",
            id: key.clone(),
        })?;
    let content_type = infer_content_type(None, &bytes);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// GET /channels
pub async fn list_channels(State(state): State<GatewayState>) -> ApiResult<Json<Vec<Channel>>> {
    Ok(Json(channels::list_channels(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChannelUpdate {
    pub active: bool,
}

/// PATCH /channels/{channel_id}; owners only.
pub async fn update_channel(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(channel_id): Path<i64>,
    Json(body): Json<ChannelUpdate>,
) -> ApiResult<Json<Channel>> {
    if !identity.is_owner {
        return Err(ApiError::forbidden("only owners can change channels"));
    }
    if !channels::set_channel_active(&state.db, channel_id, body.active).await? {
        return Err(OmnichatError::NotFound {
            entity: "channel",
            id: channel_id.to_string(),
        }
        .into());
    }
    info!(channel_id, active = body.active, user_id = identity.user_id, "channel updated");
    let channel = channels::get_channel(&state.db, channel_id)
        .await?
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "channel",
            id: channel_id.to_string(),
        })?;
    Ok(Json(channel))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatListParams {
    pub channel_id: Option<i64>,
    pub status: Option<ChatStatus>,
    pub search: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub sort_by: Option<ChatSort>,
    pub sort_order: Option<SortOrder>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl ChatListParams {
    pub fn into_filter(self, identity: &Identity) -> ChatFilter {
        let base = ChatFilter::for_tenant(identity.tenant_id);
        ChatFilter {
            channel_id: self.channel_id,
            status: self.status,
            search: self.search.filter(|s| !s.trim().is_empty()),
            created_from: self.created_from,
            created_to: self.created_to,
            sort_by: self.sort_by.unwrap_or_default(),
            sort_order: self.sort_order.unwrap_or_default(),
            skip: self.skip.unwrap_or(0),
            limit: self.limit.unwrap_or(base.limit).clamp(1, MAX_PAGE),
            ..base
        }
    }
}

/// GET /chats
pub async fn list_chats(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ChatListParams>,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let filter = params.into_filter(&identity);
    Ok(Json(chats::list_chats(&state.db, &filter).await?))
}

/// GET /chats/{chat_id}
pub async fn get_chat(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<Chat>> {
    Ok(Json(
        chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?,
    ))
}

/// Client acting for the chat's credential.
pub(crate) async fn client_for_chat(
    state: &GatewayState,
    chat: &Chat,
) -> Result<Arc<dyn PlatformClient>, OmnichatError> {
    let channel = channels::get_channel(&state.db, chat.channel_id)
        .await?
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "channel",
            id: chat.channel_id.to_string(),
        })?;
    let view = state.vault.load(chat.channel_id, chat.tenant_id).await?;
    state
        .platforms
        .client_for(&view.credential_ref(channel.channel_type))
}

/// DELETE /chats/{chat_id}
///
/// Closes the remote conversation when the platform supports it, then marks
/// the local chat CLOSED either way.
pub async fn close_chat(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<Chat>> {
    let chat = chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    match client_for_chat(&state, &chat).await {
        Ok(client) => {
            if let Err(e) = client.close_chat(&chat.external_chat_id).await {
                warn!(chat_id, error = %e, "remote chat close failed");
            }
        }
        Err(e) => warn!(chat_id, error = %e, "no platform client to close chat"),
    }
    chats::set_chat_status(&state.db, chat_id, ChatStatus::Closed).await?;
    info!(chat_id, user_id = identity.user_id, "chat closed");
    let chat = chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    Ok(Json(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChainContact {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// POST /chats/{chat_id}/chain-contact
pub async fn chain_contact(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
    Json(body): Json<ChainContact>,
) -> ApiResult<Json<Chat>> {
    let chat = chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    let phone = normalize_phone(&body.phone)
        .ok_or_else(|| ApiError::bad_request(format!("invalid phone number: {}", body.phone)))?;
    let name = body.name.filter(|n| !n.trim().is_empty());
    let contact = contacts::find_or_create_by_phone(&state.db, chat.channel_id, &phone, name).await?;
    let chat = chats::set_chat_contact(&state.db, chat.id, contact.id).await?;
    info!(chat_id, contact_id = contact.id, "contact chained");
    Ok(Json(chat))
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /chats/{chat_id}/messages, oldest first.
pub async fn list_messages(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    let limit = page.limit.unwrap_or(100).clamp(1, MAX_PAGE);
    let rows = messages::list_messages(&state.db, chat_id, limit, page.offset.unwrap_or(0)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct SendBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
}

/// Parse a message type name case-insensitively.
pub(crate) fn parse_message_type(raw: &str) -> Result<MessageType, ApiError> {
    MessageType::from_str(&raw.trim().to_ascii_uppercase())
        .map_err(|_| ApiError::bad_request(format!("unknown message_type: {raw}")))
}

/// POST /chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
    Json(body): Json<SendBody>,
) -> ApiResult<(StatusCode, Json<Vec<ChatMessage>>)> {
    let mut request = SendRequest::new(chat_id, identity.tenant_id)
        .source(MessageSource::Api)
        .user(identity.user_id);
    if let Some(text) = body.text.filter(|t| !t.is_empty()) {
        request = request.text(text);
    }
    if let Some(url) = body.image_url.or(body.media_url).filter(|u| !u.is_empty()) {
        request = request.media_url(url);
    }
    if let Some(raw) = body.message_type.as_deref().filter(|s| !s.is_empty()) {
        request = request.message_type(parse_message_type(raw)?);
    }
    let rows = state.sender.send(request).await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

/// DELETE /chats/{chat_id}/messages/{message_id}
pub async fn delete_message(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ChatMessage>> {
    let chat = chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    let message = messages::get_message(&state.db, message_id)
        .await?
        .filter(|m| m.chat_id == chat.id)
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "message",
            id: message_id.to_string(),
        })?;

    if let Some(external) = message.external_message_id.as_deref() {
        match client_for_chat(&state, &chat).await {
            Ok(client) => match client.delete_message(&chat.external_chat_id, external).await {
                Ok(true) => {}
                Ok(false) => warn!(chat_id, message_id, "platform did not delete the message"),
                Err(e) => warn!(chat_id, message_id, error = %e, "remote delete failed"),
            },
            Err(e) => warn!(chat_id, error = %e, "no platform client to delete message"),
        }
    }

    let updated = messages::update_message(
        &state.db,
        message_id,
        &MessageUpdate {
            status: Some(MessageStatus::Deleted),
            ..MessageUpdate::default()
        },
    )
    .await?;
    state.fanout.message(chat.tenant_id, &updated);
    info!(chat_id, message_id, user_id = identity.user_id, "message deleted");
    Ok(Json(updated))
}

/// GET /chats/{chat_id}/files
pub async fn chat_files(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<Vec<Picture>>> {
    chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await?;
    let rows = pictures::list_for_chat(&state.db, chat_id).await?;
    Ok(Json(absolute(&state, rows)))
}

/// GET /messages/{message_id}/files
pub async fn message_files(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<Vec<Picture>>> {
    let message = messages::get_message(&state.db, message_id)
        .await?
        .ok_or_else(|| OmnichatError::NotFound {
            entity: "message",
            id: message_id.to_string(),
        })?;
    chats::get_chat_for_tenant(&state.db, message.chat_id, identity.tenant_id).await?;
    let rows = pictures::list_for_message(&state.db, message_id).await?;
    Ok(Json(absolute(&state, rows)))
}

fn absolute(state: &GatewayState, rows: Vec<Picture>) -> Vec<Picture> {
    rows.into_iter()
        .map(|mut p| {
            p.url = omnichat_core::media::public_url(&state.public_base_url, &p.url);
            p
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> Identity {
        Identity {
            user_id: 7,
            tenant_id: 3,
            is_owner: false,
            name: None,
        }
    }

    #[test]
    fn list_params_are_clamped_and_scoped() {
        let params: ChatListParams =
            serde_json::from_value(serde_json::json!({"limit": 5000, "sort_by": "name", "search": " "}))
                .unwrap();
        let filter = params.into_filter(&operator());
        assert_eq!(filter.tenant_id, 3);
        assert_eq!(filter.limit, MAX_PAGE);
        assert_eq!(filter.sort_by, ChatSort::Name);
        assert_eq!(filter.search, None);
        assert_eq!(filter.sort_order, SortOrder::Desc);
    }

    #[test]
    fn message_types_parse_case_insensitively() {
        assert_eq!(parse_message_type("image").unwrap(), MessageType::Image);
        assert_eq!(parse_message_type("Document").unwrap(), MessageType::Document);
        assert_eq!(
            parse_message_type("sticker").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn health_labels() {
        assert_eq!(health_label(&HealthStatus::Healthy), "healthy");
        assert_eq!(
            health_label(&HealthStatus::Degraded("slow".into())),
            "degraded: slow"
        );
    }
}
