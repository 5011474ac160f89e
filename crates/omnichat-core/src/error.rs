// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the chat integration core.

use thiserror::Error;

/// The primary error type shared by every crate in the workspace.
#[derive(Debug, Error)]
pub enum OmnichatError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No cipher key is configured for the credential vault.
    #[error("credential vault is not configured")]
    VaultUnconfigured,

    /// Ciphertext could not be authenticated with the configured key.
    #[error("credential vault decryption failed: {0}")]
    VaultDecryptFailed(String),

    /// No credential exists for the requested scope.
    #[error("credential not found: {0}")]
    VaultNotFound(String),

    /// The access token is expired and could not be refreshed.
    #[error("token expired for credential {credential_id}: {reason}")]
    TokenExpired { credential_id: i64, reason: String },

    /// Non-2xx response from a remote platform.
    #[error("platform error {status}: {message}")]
    Platform { status: u16, message: String },

    /// The platform account lacks the subscription required for the call.
    #[error("platform subscription required: {message}")]
    SubscriptionRequired { message: String },

    /// A tenant-scoped entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller is not allowed to touch the entity.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// The same operator message was submitted twice inside the dedup window.
    #[error("duplicate message in chat {chat_id}")]
    DuplicateMessage { chat_id: i64 },

    /// Malformed inbound payload or request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport-level HTTP failures (connect, TLS, body decode).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OmnichatError {
    /// Builds a [`OmnichatError::Storage`] from any displayable error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            source: message.into().into(),
        }
    }

    /// True when the platform rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Platform { status: 401, .. })
    }

    /// True for failures worth retrying later (network, throttling, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::Platform { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// HTTP status code used when the error reaches the REST edge.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::TokenExpired { .. } => 401,
            Self::SubscriptionRequired { .. } => 402,
            Self::AccessDenied { .. } => 403,
            Self::NotFound { .. } | Self::VaultNotFound(_) => 404,
            Self::DuplicateMessage { .. } => 409,
            Self::Platform { .. } | Self::Http { .. } => 502,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }
}
