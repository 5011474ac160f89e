// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by every pluggable collaborator.

use async_trait::async_trait;

use crate::error::OmnichatError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, lifecycle, and health for a collaborator.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Stable name used in logs and `/health` output.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Cheap liveness check; must not call out to the remote platform.
    async fn health_check(&self) -> Result<HealthStatus, OmnichatError>;

    /// Releases held resources. Most adapters hold none.
    async fn shutdown(&self) -> Result<(), OmnichatError> {
        Ok(())
    }
}
