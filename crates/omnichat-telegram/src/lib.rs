// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram bot platform for the omnichannel chat core.
//!
//! [`TelegramClient`] implements [`omnichat_core::PlatformClient`] over the
//! raw Bot API. Bot tokens are static credentials read through the token
//! manager and never refreshed. Inbound `Update`s are converted by
//! [`convert::parse_update`] and arrive either by webhook or through the
//! long-polling workers in [`polling`].

pub mod client;
pub mod convert;
pub mod factory;
pub mod media;
pub mod polling;

pub use client::TelegramClient;
pub use convert::{InboundUpdate, UpdateKind, parse_update};
pub use factory::TelegramFactory;
pub use media::{MediaGroups, TelegramMedia};
pub use polling::{PollSettings, PollingSupervisor, UpdateHandler};
