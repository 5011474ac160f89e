// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator authentication middleware.
//!
//! Tokens come from `Authorization: Bearer <token>` or, for clients that
//! cannot set headers, a `token` query parameter. The resolved
//! [`Identity`] is stored in the request extensions for handlers.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use omnichat_core::OmnichatError;
use tracing::debug;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Pull the operator token from the headers or the query string.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .filter(|t| !t.is_empty())
    })
}

/// Resolve the token through the identity chain and attach the identity.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), request.uri().query())
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let identity = state.identity.resolve(&token).await.map_err(|e| match e {
        OmnichatError::AccessDenied { reason } => {
            debug!(reason = %reason, "operator token rejected");
            ApiError::unauthorized("invalid token")
        }
        other => ApiError::from(other),
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
