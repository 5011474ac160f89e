// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket gateway for the omnichat core.
//!
//! Serves the operator REST API, the per-chat and per-tenant sockets, the
//! platform webhooks and the public media route.

pub mod auth;
pub mod avito;
pub mod connect;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod server;
pub mod telegram;
pub mod ws;

pub use connect::{AvitoConnect, AvitoConnectRequest, AvitoConnection, TelegramConnect, TelegramConnection};
pub use error::{ApiError, ApiResult};
pub use identity::{HttpIdentity, IdentityChain, OperatorTable};
pub use server::{GatewayState, ServerConfig, router, start_server};
