// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message bus publishing for downstream consumers.
//!
//! [`MessageBus`] wraps any [`BusPublisher`] and never fails its caller:
//! broker errors are logged and swallowed so persistence and realtime
//! delivery are never held up by the broker.

pub mod events;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use omnichat_config::model::{BusConfig, HttpConfig};
use omnichat_core::types::{ChannelType, ChatMessage, HealthStatus};
use omnichat_core::{BusPublisher, OmnichatError};
use serde::Serialize;
use tracing::{info, warn};

pub use events::{MessagePublished, NewChatPublished, PresencePublished, TypingPublished};
pub use http::HttpBrokerPublisher;

/// Fire-and-forget publisher. A bus without a transport drops events.
#[derive(Clone, Default)]
pub struct MessageBus {
    publisher: Option<Arc<dyn BusPublisher>>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("publisher", &self.publisher.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl MessageBus {
    pub fn new(publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            publisher: Some(publisher),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build the configured transport, or a disabled bus.
    pub fn from_config(bus: &BusConfig, http: &HttpConfig) -> Result<Self, OmnichatError> {
        if !bus.enabled {
            info!("message bus disabled");
            return Ok(Self::disabled());
        }
        let publisher = HttpBrokerPublisher::new(bus, Duration::from_secs(http.timeout_secs))?;
        info!(exchange = %bus.exchange, "message bus enabled");
        Ok(Self::new(Arc::new(publisher)))
    }

    pub fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Broker reachability; `None` when disabled.
    pub async fn health(&self) -> Option<HealthStatus> {
        let publisher = self.publisher.as_ref()?;
        Some(
            publisher
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
        )
    }

    /// Publish any serializable payload, logging failures.
    pub async fn publish<T: Serialize>(&self, routing_key: &str, payload: &T) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(routing_key, error = %e, "failed to encode bus payload");
                return;
            }
        };
        if let Err(e) = publisher.publish(routing_key, &value).await {
            warn!(routing_key, error = %e, "bus publish failed");
        }
    }

    pub async fn message(
        &self,
        message: &ChatMessage,
        channel_type: Option<ChannelType>,
        user_id: Option<i64>,
    ) {
        self.publish(
            events::MESSAGES,
            &MessagePublished::new(message, channel_type, user_id),
        )
        .await;
    }

    pub async fn typing(&self, event: &TypingPublished) {
        self.publish(events::TYPING, event).await;
    }

    pub async fn user_connected(&self, event: &PresencePublished) {
        self.publish(events::USER_CONNECTED, event).await;
    }

    pub async fn user_disconnected(&self, event: &PresencePublished) {
        self.publish(events::USER_DISCONNECTED, event).await;
    }

    pub async fn new_chat(&self, event: &NewChatPublished) {
        self.publish(events::NEW_CHAT, event).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use omnichat_core::PluginAdapter;
    use omnichat_core::types::AdapterType;
    use serde_json::{Value, json};
    use tracing_test::traced_test;

    use super::*;

    struct Unreachable;

    #[async_trait]
    impl PluginAdapter for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Bus
        }

        async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
            Ok(HealthStatus::Unhealthy("connection refused".into()))
        }
    }

    #[async_trait]
    impl BusPublisher for Unreachable {
        async fn publish(&self, _routing_key: &str, _payload: &Value) -> Result<(), OmnichatError> {
            Err(OmnichatError::Internal("connection refused".into()))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn publish_failures_are_logged_not_returned() {
        let bus = MessageBus::new(Arc::new(Unreachable));
        bus.publish(events::TYPING, &json!({"chat_id": 1})).await;
        assert!(logs_contain("bus publish failed"));
        assert!(logs_contain("connection refused"));
    }

    #[tokio::test]
    async fn health_reports_the_transport() {
        let bus = MessageBus::new(Arc::new(Unreachable));
        assert!(matches!(bus.health().await, Some(HealthStatus::Unhealthy(_))));
        assert!(MessageBus::disabled().health().await.is_none());
    }
}
