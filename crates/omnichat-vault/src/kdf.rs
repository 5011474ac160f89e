// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase to vault key, via Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use omnichat_config::model::VaultConfig;
use omnichat_core::OmnichatError;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;

/// Argon2id cost settings taken from `[vault]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&VaultConfig> for KdfParams {
    fn from(config: &VaultConfig) -> Self {
        Self {
            memory_kib: config.kdf_memory_cost,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

impl KdfParams {
    fn hasher(&self) -> Result<Argon2<'static>, OmnichatError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| OmnichatError::Config(format!("vault kdf settings rejected: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Derive the 32-byte vault key. CPU bound; run off the async runtime.
    pub fn derive(
        &self,
        passphrase: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, OmnichatError> {
        let mut key = Zeroizing::new([0u8; 32]);
        self.hasher()?
            .hash_password_into(passphrase, salt, key.as_mut())
            .map_err(|e| OmnichatError::Internal(format!("vault key derivation: {e}")))?;
        Ok(key)
    }
}

/// Fresh salt for a database that has none stored yet.
pub fn generate_salt() -> Result<[u8; SALT_LEN], OmnichatError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| OmnichatError::Internal("system RNG unavailable for vault salt".to_string()))?;
    Ok(salt)
}
