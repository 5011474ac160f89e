// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access-token lifecycle for platform credentials.
//!
//! [`TokenManager`] keeps each credential's access token valid, coalescing
//! concurrent refreshes behind one mutex per credential. [`OAuthTokenClient`]
//! speaks the OAuth2 `/token/` form protocol. The [`http`] module holds the
//! shared reqwest setup used by every platform client.

pub mod endpoint;
pub mod http;
pub mod manager;

pub use endpoint::OAuthTokenClient;
pub use manager::{TokenManager, TokenState};
