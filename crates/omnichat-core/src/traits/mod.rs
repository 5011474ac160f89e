// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits.
//!
//! Everything the chat core talks to outside its own database sits behind
//! one of these traits so tests can swap in in-memory doubles.

pub mod adapter;
pub mod bus;
pub mod identity;
pub mod media;
pub mod platform;
pub mod token;

pub use adapter::PluginAdapter;
pub use bus::BusPublisher;
pub use identity::IdentityResolver;
pub use media::MediaStore;
pub use platform::{PlatformClient, PlatformFactory, PlatformRegistry};
pub use token::{TokenEndpoint, TokenGrant, TokenResponse};
