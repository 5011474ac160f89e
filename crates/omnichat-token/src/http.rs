// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing for platform and token clients.
//!
//! Responses are read once and classified by content type: JSON bodies are
//! parsed, anything else is kept as text. On success a text body is wrapped
//! as `{"response": "<text>"}`; on failure it becomes the error message.

use std::time::Duration;

use omnichat_core::OmnichatError;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::warn;

/// Build a client with the per-call timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, OmnichatError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OmnichatError::Http {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Map a transport failure, keeping timeouts distinct.
pub fn send_error(e: reqwest::Error, timeout: Duration) -> OmnichatError {
    if e.is_timeout() {
        OmnichatError::Timeout { duration: timeout }
    } else {
        OmnichatError::Http {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// A response body, classified by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
}

impl Body {
    /// Best human-readable message for an error body.
    pub fn message(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => error_message(value).unwrap_or_else(|| value.to_string()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => json!({ "response": text }),
        }
    }
}

/// Pull `message`, `error.message`, `error_description`, `description` or a
/// string `error` out of an error document.
fn error_message(value: &Value) -> Option<String> {
    let candidates = [
        value.get("message"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error_description"),
        value.get("description"),
        value.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

/// Read a response body.
pub async fn read_body(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<(StatusCode, Body), OmnichatError> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    let text = response.text().await.map_err(|e| send_error(e, timeout))?;

    let body = if is_json || looks_like_json(&text) {
        match serde_json::from_str(&text) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(text),
        }
    } else {
        Body::Text(text)
    };
    Ok((status, body))
}

fn looks_like_json(text: &str) -> bool {
    let t = text.trim_start();
    t.starts_with('{') || t.starts_with('[')
}

/// Turn a classified response into a value or the matching error.
///
/// 402, or any error body mentioning a subscription or tariff, is reported
/// as `SubscriptionRequired` so bulk paths can skip instead of failing.
pub fn check_status(status: StatusCode, body: Body) -> Result<Value, OmnichatError> {
    if status.is_success() {
        return Ok(body.into_value());
    }
    let message = body.message();
    let lowered = message.to_lowercase();
    if status == StatusCode::PAYMENT_REQUIRED
        || lowered.contains("subscription")
        || lowered.contains("tariff")
    {
        return Err(OmnichatError::SubscriptionRequired { message });
    }
    if status != StatusCode::UNAUTHORIZED {
        warn!(status = status.as_u16(), %message, "platform returned an error");
    }
    Err(OmnichatError::Platform {
        status: status.as_u16(),
        message: if message.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            message
        },
    })
}

/// Read and check in one step.
pub async fn parse_response(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<Value, OmnichatError> {
    let (status, body) = read_body(response, timeout).await?;
    check_status(status, body)
}
