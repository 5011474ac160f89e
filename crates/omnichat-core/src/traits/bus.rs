// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport for the external message broker.

use async_trait::async_trait;

use crate::error::OmnichatError;
use crate::traits::adapter::PluginAdapter;

/// Publishes a JSON document under a routing key.
///
/// Implementations report failures; callers decide whether to swallow them.
#[async_trait]
pub trait BusPublisher: PluginAdapter {
    async fn publish(&self, routing_key: &str, payload: &serde_json::Value)
    -> Result<(), OmnichatError>;
}
