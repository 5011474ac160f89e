// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History synchronizer: replays a tenant's remote chats and messages into
//! local storage through the same router the webhook path uses.

pub mod summary;
pub mod synchronizer;

pub use summary::{ChatReport, SyncSummary};
pub use synchronizer::{HistorySync, SyncSettings, is_recent};
