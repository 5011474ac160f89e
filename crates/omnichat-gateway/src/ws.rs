// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator WebSocket endpoints.
//!
//! `/ws/chats/{chat_id}/` joins one chat; `/ws/chats/all/` follows every
//! chat of the operator's tenant. Authentication happens after the upgrade
//! so a rejected socket still receives an error frame before the policy
//! close.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use omnichat_bus::{PresencePublished, TypingPublished};
use omnichat_core::time;
use omnichat_core::types::{Chat, Identity};
use omnichat_core::{MessageSource, OmnichatError, SenderType};
use omnichat_fanout::{ChatFrame, ConnectionId, ErrorFrame, Inbound, InboundMessage, PresenceView, TenantFrame, TypingView};
use omnichat_outbound::SendRequest;
use omnichat_storage::queries::chats;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::extract_token;
use crate::error::ApiError;
use crate::handlers::parse_message_type;
use crate::server::GatewayState;

/// GET /ws/chats/{chat_id}/
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Path(chat_id): Path<i64>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = extract_token(&headers, query.as_deref());
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, chat_id, token))
}

/// GET /ws/chats/all/
pub async fn tenant_socket(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = extract_token(&headers, query.as_deref());
    ws.on_upgrade(move |socket| handle_tenant_socket(socket, state, token))
}

/// Forward queued frames to the socket. When the hub drops the queue (the
/// socket fell too far behind) the client gets a 1013 close; the read loop
/// stops once this task ends.
async fn write_frames(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<String>,
) {
    while let Some(frame) = frames.recv().await {
        if ws_sender.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    debug!("frame queue closed; closing socket");
    let _ = ws_sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::AGAIN,
            reason: "too slow; reconnect".into(),
        })))
        .await;
}

fn encode<T: Serialize>(frame: &T) -> String {
    serde_json::to_string(frame).unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string())
}

/// Send one error frame and close with 1008.
async fn reject(mut socket: WebSocket, error: ApiError) {
    let frame = ErrorFrame::new(error.error, error.detail);
    let _ = socket.send(Message::Text(encode(&frame).into())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "policy violation".into(),
        })))
        .await;
}

async fn authenticate(state: &GatewayState, token: Option<String>) -> Result<Identity, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("missing token"))?;
    state.identity.resolve(&token).await.map_err(|e| match e {
        OmnichatError::AccessDenied { .. } => ApiError::unauthorized("invalid token"),
        other => ApiError::from(other),
    })
}

fn error_frame(e: OmnichatError) -> ErrorFrame {
    let api = ApiError::from(e);
    ErrorFrame::new(api.error, api.detail)
}

async fn handle_chat_socket(
    socket: WebSocket,
    state: GatewayState,
    chat_id: i64,
    token: Option<String>,
) {
    let identity = match authenticate(&state, token).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!(chat_id, "chat socket rejected: {:?}", e.detail);
            return reject(socket, e).await;
        }
    };
    let chat = match chats::get_chat_for_tenant(&state.db, chat_id, identity.tenant_id).await {
        Ok(chat) => chat,
        Err(e) => return reject(socket, ApiError::from(e)).await,
    };

    let hub = state.fanout.chats();
    let (conn_id, frames) = hub.connect(chat.id, identity.user_id);
    info!(chat_id, user_id = identity.user_id, %conn_id, "chat socket connected");

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = tokio::spawn(write_frames(ws_sender, frames));

    hub.send_to(
        chat.id,
        conn_id,
        &ChatFrame::Connected {
            chat_id: chat.id,
            user_id: identity.user_id,
            timestamp: time::now(),
        },
    );
    announce(&state, &chat, &identity, true).await;

    loop {
        let next = tokio::select! {
            biased;
            () = state.shutdown.cancelled() => break,
            _ = &mut writer => break,
            next = ws_receiver.next() => next,
        };
        let Some(Ok(message)) = next else { break };
        match message {
            Message::Text(text) => {
                handle_chat_frame(&state, &chat, &identity, conn_id, text.as_str()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    hub.disconnect(chat.id, conn_id);
    announce(&state, &chat, &identity, false).await;
    info!(chat_id, user_id = identity.user_id, %conn_id, "chat socket disconnected");
}

async fn announce(state: &GatewayState, chat: &Chat, identity: &Identity, connected: bool) {
    let timestamp = time::now();
    let view = PresenceView {
        chat_id: chat.id,
        user_id: identity.user_id,
        user_type: SenderType::Operator.to_string(),
        timestamp: timestamp.clone(),
    };
    let event = PresencePublished {
        chat_id: chat.id,
        user_id: identity.user_id,
        user_type: SenderType::Operator.to_string(),
        timestamp,
    };
    if connected {
        state.fanout.user_connected(chat.tenant_id, view);
        state.bus.user_connected(&event).await;
    } else {
        state.fanout.user_disconnected(chat.tenant_id, view);
        state.bus.user_disconnected(&event).await;
    }
}

async fn handle_chat_frame(
    state: &GatewayState,
    chat: &Chat,
    identity: &Identity,
    conn_id: ConnectionId,
    text: &str,
) {
    let hub = state.fanout.chats();
    let inbound: Inbound = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            hub.send_to(
                chat.id,
                conn_id,
                &ErrorFrame::new("Invalid message", Some(e.to_string())),
            );
            return;
        }
    };

    match inbound {
        Inbound::Message(message) => {
            if let Err(frame) = send_from_socket(state, chat, identity, message).await {
                hub.send_to(chat.id, conn_id, &frame);
            }
        }
        Inbound::Typing { is_typing } => {
            let timestamp = time::now();
            let user_id = identity.user_id.to_string();
            state.fanout.typing(
                chat.tenant_id,
                TypingView {
                    chat_id: chat.id,
                    user_id: Some(user_id.clone()),
                    user_type: SenderType::Operator,
                    is_typing,
                    timestamp: timestamp.clone(),
                },
            );
            state
                .bus
                .typing(&TypingPublished {
                    chat_id: chat.id,
                    user_id: Some(user_id),
                    user_type: SenderType::Operator,
                    is_typing,
                    timestamp,
                })
                .await;
        }
        Inbound::GetUsers => {
            hub.send_to(
                chat.id,
                conn_id,
                &ChatFrame::UsersList {
                    chat_id: chat.id,
                    users: hub.users(chat.id),
                },
            );
        }
    }
}

/// Persist and deliver an operator message. The stored row reaches every
/// socket of the chat, this one included, through the fanout.
async fn send_from_socket(
    state: &GatewayState,
    chat: &Chat,
    identity: &Identity,
    message: InboundMessage,
) -> Result<(), ErrorFrame> {
    if let Some(sender_type) = message.sender_type.as_deref() {
        if !sender_type.eq_ignore_ascii_case("OPERATOR") {
            return Err(ErrorFrame::new(
                "Invalid message",
                Some(format!("operators cannot send as {}", sender_type.to_ascii_uppercase())),
            ));
        }
    }

    let mut request = SendRequest::new(chat.id, identity.tenant_id)
        .source(MessageSource::Web)
        .user(identity.user_id);
    if !message.content.is_empty() {
        request = request.text(message.content);
    }
    let media = message
        .image_url
        .or(message.file_url)
        .or_else(|| message.files.into_iter().next())
        .filter(|u| !u.is_empty());
    if let Some(url) = media {
        request = request.media_url(url);
    }
    if let Some(raw) = message.message_type.as_deref().filter(|s| !s.is_empty()) {
        let message_type =
            parse_message_type(raw).map_err(|e| ErrorFrame::new("Invalid message", e.detail))?;
        request = request.message_type(message_type);
    }

    match state.sender.send(request).await {
        Ok(rows) => {
            debug!(chat_id = chat.id, stored = rows.len(), "socket message sent");
            Ok(())
        }
        // The sender already told the chat about the duplicate.
        Err(OmnichatError::DuplicateMessage { .. }) => Ok(()),
        Err(e) => {
            warn!(chat_id = chat.id, error = %e, "socket message failed");
            Err(error_frame(e))
        }
    }
}

async fn handle_tenant_socket(socket: WebSocket, state: GatewayState, token: Option<String>) {
    let identity = match authenticate(&state, token).await {
        Ok(identity) => identity,
        Err(e) => return reject(socket, e).await,
    };
    let tenant_id = identity.tenant_id;
    let hub = state.fanout.tenants();
    let (conn_id, frames) = hub.connect(tenant_id, identity.user_id);
    info!(tenant_id, user_id = identity.user_id, %conn_id, "tenant socket connected");

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = tokio::spawn(write_frames(ws_sender, frames));

    hub.send_to(
        tenant_id,
        conn_id,
        &TenantFrame::Connected {
            tenant_id,
            user_id: identity.user_id,
            timestamp: time::now(),
        },
    );

    loop {
        let next = tokio::select! {
            biased;
            () = state.shutdown.cancelled() => break,
            _ = &mut writer => break,
            next = ws_receiver.next() => next,
        };
        let Some(Ok(message)) = next else { break };
        match message {
            Message::Text(text) => match serde_json::from_str::<Inbound>(text.as_str()) {
                Ok(Inbound::GetUsers) => {
                    hub.send_to(
                        tenant_id,
                        conn_id,
                        &TenantFrame::UsersList {
                            tenant_id,
                            users: hub.users(tenant_id),
                        },
                    );
                }
                Ok(_) => {
                    hub.send_to(
                        tenant_id,
                        conn_id,
                        &ErrorFrame::new(
                            "Invalid message",
                            Some("tenant sockets only accept get_users".to_string()),
                        ),
                    );
                }
                Err(e) => {
                    hub.send_to(
                        tenant_id,
                        conn_id,
                        &ErrorFrame::new("Invalid message", Some(e.to_string())),
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    hub.disconnect(tenant_id, conn_id);
    info!(tenant_id, user_id = identity.user_id, %conn_id, "tenant socket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omnichat_errors_become_error_frames() {
        let frame = error_frame(OmnichatError::NotFound {
            entity: "chat",
            id: "9".into(),
        });
        assert_eq!(frame.error, "Not found");
        assert!(frame.detail.is_some());
    }

    #[test]
    fn frames_encode_as_json() {
        let json = encode(&ErrorFrame::new("Unauthorized", None));
        assert_eq!(json, r#"{"error":"Unauthorized"}"#);
    }
}
