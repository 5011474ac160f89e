// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Avito messenger client.
//!
//! [`AvitoClient`] implements the uniform [`omnichat_core::PlatformClient`]
//! operation set over the Avito REST API. Every call obtains its bearer
//! token through the token manager, which refreshes and retries once on 401.

pub mod client;
pub mod convert;
pub mod factory;

pub use client::AvitoClient;
pub use factory::AvitoFactory;
