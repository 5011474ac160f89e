// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use omnichat_bus::MessageBus;
use omnichat_core::{IdentityResolver, MediaStore, OmnichatError, PlatformFactory};
use omnichat_fanout::Fanout;
use omnichat_ingest::WebhookIngestor;
use omnichat_outbound::OutboundSender;
use omnichat_storage::Database;
use omnichat_sync::HistorySync;
use omnichat_vault::Vault;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::connect::{AvitoConnect, TelegramConnect};
use crate::{avito, handlers, telegram, ws};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    pub vault: Arc<Vault>,
    pub platforms: Arc<dyn PlatformFactory>,
    pub identity: Arc<dyn IdentityResolver>,
    pub fanout: Arc<Fanout>,
    pub bus: MessageBus,
    pub ingestor: Arc<WebhookIngestor>,
    pub sender: Arc<OutboundSender>,
    pub history: Arc<HistorySync>,
    /// Backing store for `/api/v1/photos/`.
    pub media: Arc<dyn MediaStore>,
    pub public_base_url: String,
    /// `None` when the Avito application is not configured.
    pub avito: Option<Arc<AvitoConnect>>,
    pub telegram: Option<Arc<TelegramConnect>>,
    pub started_at: Instant,
    /// Cancels background work spawned by requests, such as detached syncs.
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("public_base_url", &self.public_base_url)
            .field("avito", &self.avito.is_some())
            .field("telegram", &self.telegram.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full route table.
///
/// Webhooks, media, health and WebSockets are public: webhooks carry their
/// own signatures and sockets authenticate after the upgrade so failures can
/// be reported in-band. Everything else requires an operator token.
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/photos/{*key}", get(handlers::photo))
        .route("/chats/avito/webhooks/{tenant_id}", post(avito::webhook))
        .route("/chats/avito/oauth/callback", get(avito::oauth_callback))
        .route("/chats/telegram/webhook/{credential_id}", post(telegram::webhook))
        .route("/ws/chats/all/", get(ws::tenant_socket))
        .route("/ws/chats/{chat_id}/", get(ws::chat_socket))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/channels", get(handlers::list_channels))
        .route("/channels/{channel_id}", axum::routing::patch(handlers::update_channel))
        .route("/chats", get(handlers::list_chats))
        .route("/chats/{chat_id}", get(handlers::get_chat).delete(handlers::close_chat))
        .route("/chats/{chat_id}/chain-contact", post(handlers::chain_contact))
        .route(
            "/chats/{chat_id}/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            delete(handlers::delete_message),
        )
        .route("/chats/{chat_id}/files", get(handlers::chat_files))
        .route("/messages/{message_id}/files", get(handlers::message_files))
        .route("/chats/avito/connect", post(avito::connect))
        .route("/chats/avito/oauth/authorize", get(avito::authorize))
        .route("/chats/avito/status", get(avito::status))
        .route("/chats/avito/history/load", post(avito::load_history))
        .route("/chats/avito/chats/{chat_id}/mark-read", post(avito::mark_read))
        .route("/chats/telegram/connect", post(telegram::connect))
        .route("/chats/telegram/status", get(telegram::status))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), OmnichatError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OmnichatError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| OmnichatError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
