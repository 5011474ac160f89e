// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound side of the chat core: operator messages to the platform,
//! media fetching and the object store behind `/api/v1/photos`.

pub mod fetch;
pub mod sender;
pub mod store;

pub use fetch::{FetchedMedia, MediaFetcher};
pub use sender::{DEDUP_WINDOW, OutboundSender, SendRequest};
pub use store::FsMediaStore;
