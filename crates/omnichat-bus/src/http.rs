// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker transport over the management HTTP publishing API.
//!
//! `POST {broker_url}/api/exchanges/{vhost}/{exchange}/publish` with body
//! `{properties, routing_key, payload, payload_encoding: "string"}`. The
//! broker answers `{"routed": bool}`; an unrouted message is logged, not
//! treated as an error.

use std::time::Duration;

use async_trait::async_trait;
use omnichat_config::model::BusConfig;
use omnichat_core::{AdapterType, BusPublisher, HealthStatus, OmnichatError, PluginAdapter};
use omnichat_token::http;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

pub struct HttpBrokerPublisher {
    client: reqwest::Client,
    publish_url: Url,
    overview_url: Url,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpBrokerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBrokerPublisher")
            .field("publish_url", &self.publish_url.as_str())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl HttpBrokerPublisher {
    pub fn new(config: &BusConfig, timeout: Duration) -> Result<Self, OmnichatError> {
        let base = Url::parse(&config.broker_url)
            .map_err(|e| OmnichatError::Config(format!("invalid bus.broker_url: {e}")))?;
        let mut publish_url = base.clone();
        publish_url
            .path_segments_mut()
            .map_err(|()| OmnichatError::Config("bus.broker_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["api", "exchanges", &config.vhost, &config.exchange, "publish"]);
        let mut overview_url = base;
        overview_url
            .path_segments_mut()
            .map_err(|()| OmnichatError::Config("bus.broker_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["api", "overview"]);
        Ok(Self {
            client: http::build_client(timeout)?,
            publish_url,
            overview_url,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }
}

#[async_trait]
impl PluginAdapter for HttpBrokerPublisher {
    fn name(&self) -> &str {
        "http-broker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bus
    }

    async fn health_check(&self) -> Result<HealthStatus, OmnichatError> {
        let request = self.authorize(self.client.get(self.overview_url.clone()));
        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Degraded(format!(
                "broker answered HTTP {}",
                response.status().as_u16()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(http::send_error(e, self.timeout).to_string())),
        }
    }
}

#[async_trait]
impl BusPublisher for HttpBrokerPublisher {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), OmnichatError> {
        let body = json!({
            "properties": {"content_type": "application/json", "delivery_mode": 2},
            "routing_key": routing_key,
            "payload": payload.to_string(),
            "payload_encoding": "string",
        });
        let response = self
            .authorize(self.client.post(self.publish_url.clone()).json(&body))
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        let (status, body) = http::read_body(response, self.timeout).await?;
        let result = http::check_status(status, body)?;
        if result.get("routed").and_then(Value::as_bool) == Some(false) {
            warn!(routing_key, "broker accepted an unrouted message");
        } else {
            debug!(routing_key, "published to broker");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_url_escapes_default_vhost() {
        let config = BusConfig {
            enabled: true,
            broker_url: "http://rabbit:15672/".into(),
            vhost: "/".into(),
            exchange: "chats".into(),
            username: Some("guest".into()),
            password: Some("s3cret".into()),
        };
        let publisher = HttpBrokerPublisher::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            publisher.publish_url.as_str(),
            "http://rabbit:15672/api/exchanges/%2F/chats/publish"
        );
        assert!(!format!("{publisher:?}").contains("s3cret"));
    }

    #[test]
    fn invalid_broker_url_is_config_error() {
        let config = BusConfig {
            broker_url: "not a url".into(),
            ..BusConfig::default()
        };
        assert!(matches!(
            HttpBrokerPublisher::new(&config, Duration::from_secs(5)),
            Err(OmnichatError::Config(_))
        ));
    }
}
