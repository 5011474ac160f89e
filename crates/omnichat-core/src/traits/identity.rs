// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-to-identity resolution for operators.

use async_trait::async_trait;

use crate::error::OmnichatError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Identity;

/// Resolves an operator bearer token to a user and tenant.
///
/// Unknown tokens yield [`OmnichatError::AccessDenied`].
#[async_trait]
pub trait IdentityResolver: PluginAdapter {
    async fn resolve(&self, token: &str) -> Result<Identity, OmnichatError>;
}
