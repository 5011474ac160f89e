// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary sink for attachments and avatars.

use async_trait::async_trait;

use crate::error::OmnichatError;
use crate::traits::adapter::PluginAdapter;

/// Object store holding media blobs. Keys are opaque to callers.
#[async_trait]
pub trait MediaStore: PluginAdapter {
    /// Store `bytes` and return the key they were written under.
    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, OmnichatError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, OmnichatError>;
}
