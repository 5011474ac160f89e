// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for omnichat integration tests.
//!
//! Provides in-memory collaborators and harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockPlatform`] - platform client serving seeded chats and capturing sends
//! - [`MemoryBus`], [`StaticIdentity`], [`MemoryMediaStore`] - in-memory collaborators
//! - [`TestHarness`] - the full inbound and outbound stack on a temp database

pub mod harness;
pub mod memory;
pub mod mock_platform;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory::{MemoryBus, MemoryMediaStore, StaticIdentity};
pub use mock_platform::{MockPlatform, MockPlatformFactory, RecordedSend, RecordedUpload, remote_chat, text_event};
