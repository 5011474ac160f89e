// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound side of the chat core.
//!
//! [`WebhookIngestor`] validates platform webhooks and resolves the tenant's
//! credential; [`EventRouter`] turns canonical events into stored chats and
//! messages, then publishes them to realtime subscribers and the bus.

pub mod content;
pub mod ingestor;
pub mod phone;
pub mod router;
pub mod signature;
pub mod telegram;

pub use ingestor::{IngestOutcome, WebhookIngestor};
pub use phone::{extract_phone, normalize_phone};
pub use router::{ChatHints, EventRouter, MessageRouted, RouteContext, RouteOutcome};
pub use telegram::TelegramUpdateHandler;
