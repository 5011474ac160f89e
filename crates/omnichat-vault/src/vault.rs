// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credential vault: key setup, field encryption and credential I/O.
//!
//! The process-wide key is either a base64 32-byte key or derived from a
//! passphrase with Argon2id. The Argon2 salt and a key-check value live in
//! `vault_meta`, so a restart with a different key fails loudly instead of
//! producing garbage tokens.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use omnichat_config::model::VaultConfig;
use omnichat_core::OmnichatError;
use omnichat_core::types::{ChannelType, CredentialRef, StoredCredential, TenantId};
use omnichat_storage::Database;
use omnichat_storage::models::CredentialWrite;
use omnichat_storage::queries::{credentials, vault_meta};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto;
use crate::kdf::{self, KdfParams};

const META_SALT: &str = "kdf_salt";
const META_KEY_CHECK: &str = "key_check";
const KEY_CHECK_PLAINTEXT: &str = "omnichat-vault-key-check";

/// Something happened to a stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// Created or updated through [`Vault::save`].
    Saved {
        credential_id: i64,
        channel_id: i64,
        tenant_id: TenantId,
    },
    /// Access token replaced by the token manager.
    Rotated {
        credential_id: i64,
        channel_id: i64,
        tenant_id: TenantId,
        token_expires_at: Option<String>,
    },
    Deactivated {
        channel_id: i64,
        tenant_id: TenantId,
    },
}

/// Plaintext credential fields to persist.
///
/// `None` keeps the stored value on update.
#[derive(Clone, Default)]
pub struct CredentialPatch {
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub external_account_id: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for CredentialPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPatch")
            .field("channel_id", &self.channel_id)
            .field("tenant_id", &self.tenant_id)
            .field("external_account_id", &self.external_account_id)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}

/// A decrypted credential. Secret fields stay wrapped until exposed.
pub struct CredentialView {
    pub id: i64,
    pub channel_id: i64,
    pub tenant_id: TenantId,
    pub external_account_id: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub token_expires_at: Option<String>,
    pub redirect_uri: Option<String>,
    pub active: bool,
    pub updated_at: String,
}

impl CredentialView {
    pub fn has_access_token(&self) -> bool {
        !self.access_token.expose_secret().is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.expose_secret().is_empty()
    }

    /// Non-secret reference used for routing and client construction.
    pub fn credential_ref(&self, channel_type: ChannelType) -> CredentialRef {
        CredentialRef {
            credential_id: self.id,
            channel_id: self.channel_id,
            channel_type,
            tenant_id: self.tenant_id,
            external_account_id: self.external_account_id.clone(),
        }
    }
}

impl std::fmt::Debug for CredentialView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialView")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("tenant_id", &self.tenant_id)
            .field("external_account_id", &self.external_account_id)
            .field("access_token", &mask_secret(self.access_token.expose_secret()))
            .field("token_expires_at", &self.token_expires_at)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Encrypting facade over the `channel_credentials` table.
///
/// The only writer of credential rows.
pub struct Vault {
    key: Option<Zeroizing<[u8; 32]>>,
    db: Database,
    events: broadcast::Sender<CredentialEvent>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Set up the vault from the `[vault]` section.
    ///
    /// With neither `key` nor `passphrase` the vault opens unconfigured and
    /// every credential operation fails with `VaultUnconfigured`.
    pub async fn from_config(db: Database, config: &VaultConfig) -> Result<Self, OmnichatError> {
        let key = if let Some(encoded) = &config.key {
            Some(decode_key(encoded)?)
        } else if let Some(passphrase) = &config.passphrase {
            let salt = match vault_meta::get_meta(&db, META_SALT).await? {
                Some(salt) => salt,
                None => {
                    let fresh = kdf::generate_salt()?;
                    vault_meta::put_meta_if_absent(&db, META_SALT, &fresh).await?
                }
            };
            let passphrase = Zeroizing::new(passphrase.clone().into_bytes());
            let params = KdfParams::from(config);
            let derived = tokio::task::spawn_blocking(move || params.derive(&passphrase, &salt))
            .await
            .map_err(|e| OmnichatError::Internal(format!("key derivation task failed: {e}")))??;
            Some(derived)
        } else {
            None
        };

        match key {
            Some(key) => Self::with_key(db, key).await,
            None => {
                info!("credential vault has no key; credential I/O is disabled");
                Ok(Self::unconfigured(db))
            }
        }
    }

    /// Open with an explicit key, checking it against the stored key-check value.
    pub async fn with_key(db: Database, key: Zeroizing<[u8; 32]>) -> Result<Self, OmnichatError> {
        match vault_meta::get_meta(&db, META_KEY_CHECK).await? {
            Some(stored) => {
                let encoded = String::from_utf8(stored).map_err(|_| {
                    OmnichatError::VaultDecryptFailed("key check value is not UTF-8".to_string())
                })?;
                let plaintext = crypto::decrypt_field(&key, &encoded).map_err(|_| {
                    OmnichatError::VaultDecryptFailed(
                        "configured key does not match this database".to_string(),
                    )
                })?;
                if plaintext != KEY_CHECK_PLAINTEXT {
                    return Err(OmnichatError::VaultDecryptFailed(
                        "key check value mismatch".to_string(),
                    ));
                }
            }
            None => {
                let check = crypto::encrypt_field(&key, KEY_CHECK_PLAINTEXT)?;
                vault_meta::put_meta_if_absent(&db, META_KEY_CHECK, check.as_bytes()).await?;
                debug!("stored vault key check value");
            }
        }
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            key: Some(key),
            db,
            events,
        })
    }

    pub fn unconfigured(db: Database) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            key: None,
            db,
            events,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Receive credential saves, rotations and deactivations.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    fn key(&self) -> Result<&[u8; 32], OmnichatError> {
        self.key
            .as_deref()
            .ok_or(OmnichatError::VaultUnconfigured)
    }

    /// Encrypt one field. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, OmnichatError> {
        crypto::encrypt_field(self.key()?, plaintext)
    }

    /// Decrypt one field. Empty input stays empty.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, OmnichatError> {
        crypto::decrypt_field(self.key()?, ciphertext)
    }

    fn encrypt_opt(&self, value: &Option<String>) -> Result<Option<String>, OmnichatError> {
        value.as_deref().map(|v| self.encrypt(v)).transpose()
    }

    fn view(&self, row: StoredCredential) -> Result<CredentialView, OmnichatError> {
        Ok(CredentialView {
            id: row.id,
            channel_id: row.channel_id,
            tenant_id: row.tenant_id,
            api_key: SecretString::from(self.decrypt(&row.api_key)?),
            api_secret: SecretString::from(self.decrypt(&row.api_secret)?),
            access_token: SecretString::from(self.decrypt(&row.access_token)?),
            refresh_token: SecretString::from(self.decrypt(&row.refresh_token)?),
            token_expires_at: row.token_expires_at,
            external_account_id: row.external_account_id,
            redirect_uri: row.redirect_uri,
            active: row.active,
            updated_at: row.updated_at,
        })
    }

    /// Latest active credential of `tenant_id` on `channel_id`.
    pub async fn load(
        &self,
        channel_id: i64,
        tenant_id: TenantId,
    ) -> Result<CredentialView, OmnichatError> {
        self.key()?;
        let row = credentials::get_credential(&self.db, channel_id, tenant_id)
            .await?
            .ok_or_else(|| {
                OmnichatError::VaultNotFound(format!("channel {channel_id} tenant {tenant_id}"))
            })?;
        self.view(row)
    }

    pub async fn load_by_id(&self, credential_id: i64) -> Result<CredentialView, OmnichatError> {
        self.key()?;
        let row = credentials::get_credential_by_id(&self.db, credential_id)
            .await?
            .filter(|row| row.active)
            .ok_or_else(|| OmnichatError::VaultNotFound(format!("credential {credential_id}")))?;
        self.view(row)
    }

    /// Active credential acting as a specific platform account.
    pub async fn load_for_account(
        &self,
        channel_id: i64,
        tenant_id: TenantId,
        external_account_id: &str,
    ) -> Result<CredentialView, OmnichatError> {
        self.key()?;
        let row = credentials::get_credential_for_account(
            &self.db,
            channel_id,
            tenant_id,
            external_account_id,
        )
        .await?
        .ok_or_else(|| {
            OmnichatError::VaultNotFound(format!(
                "channel {channel_id} tenant {tenant_id} account {external_account_id}"
            ))
        })?;
        self.view(row)
    }

    /// Every active credential on a channel, across tenants.
    pub async fn list_active(&self, channel_id: i64) -> Result<Vec<CredentialView>, OmnichatError> {
        self.key()?;
        credentials::list_active_credentials(&self.db, channel_id)
            .await?
            .into_iter()
            .map(|row| self.view(row))
            .collect()
    }

    /// Encrypt and upsert a credential.
    ///
    /// Credentials must name the platform account they act as, otherwise
    /// operator messages could not be told apart from client messages.
    pub async fn save(&self, patch: CredentialPatch) -> Result<CredentialView, OmnichatError> {
        if patch.external_account_id.trim().is_empty() {
            return Err(OmnichatError::Validation(
                "credential requires an external_account_id".to_string(),
            ));
        }
        let write = CredentialWrite {
            channel_id: patch.channel_id,
            tenant_id: patch.tenant_id,
            external_account_id: patch.external_account_id.trim().to_string(),
            api_key: self.encrypt_opt(&patch.api_key)?,
            api_secret: self.encrypt_opt(&patch.api_secret)?,
            access_token: self.encrypt_opt(&patch.access_token)?,
            refresh_token: self.encrypt_opt(&patch.refresh_token)?,
            token_expires_at: patch.token_expires_at.clone(),
            redirect_uri: patch.redirect_uri.clone(),
        };
        let row = credentials::upsert_credential(&self.db, &write).await?;
        info!(
            credential_id = row.id,
            channel_id = row.channel_id,
            tenant_id = row.tenant_id,
            "credential saved"
        );
        let _ = self.events.send(CredentialEvent::Saved {
            credential_id: row.id,
            channel_id: row.channel_id,
            tenant_id: row.tenant_id,
        });
        self.view(row)
    }

    /// Persist a rotated token pair together with its expiry.
    ///
    /// `refresh_token = None` keeps the stored refresh token.
    pub async fn store_tokens(
        &self,
        credential_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<&str>,
    ) -> Result<CredentialView, OmnichatError> {
        let access = self.encrypt(access_token)?;
        let refresh = refresh_token.map(|r| self.encrypt(r)).transpose()?;
        let row = credentials::update_tokens(
            &self.db,
            credential_id,
            &access,
            refresh.as_deref(),
            token_expires_at,
        )
        .await?;
        debug!(credential_id, expires_at = ?row.token_expires_at, "access token rotated");
        let _ = self.events.send(CredentialEvent::Rotated {
            credential_id,
            channel_id: row.channel_id,
            tenant_id: row.tenant_id,
            token_expires_at: row.token_expires_at.clone(),
        });
        self.view(row)
    }

    /// Soft-deactivate a tenant's credentials on a channel.
    pub async fn deactivate(&self, channel_id: i64, tenant_id: TenantId) -> Result<usize, OmnichatError> {
        let n = credentials::deactivate_credentials(&self.db, channel_id, tenant_id).await?;
        if n > 0 {
            info!(channel_id, tenant_id, count = n, "credentials deactivated");
            let _ = self.events.send(CredentialEvent::Deactivated {
                channel_id,
                tenant_id,
            });
        }
        Ok(n)
    }
}

fn decode_key(encoded: &str) -> Result<Zeroizing<[u8; 32]>, OmnichatError> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| OmnichatError::Config(format!("vault.key is not base64: {e}")))?,
    );
    let mut key = Zeroizing::new([0u8; 32]);
    if bytes.len() != key.len() {
        return Err(OmnichatError::Config(format!(
            "vault.key must decode to 32 bytes, got {}",
            bytes.len()
        )));
    }
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Preview a secret as `abcd...wxyz`; values shorter than 10 chars become `****`.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnichat_core::types::ChannelType;
    use omnichat_storage::queries::channels;

    async fn setup() -> (Vault, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let channel = channels::ensure_channel(&db, ChannelType::Avito, "Avito")
            .await
            .unwrap();
        let key = Zeroizing::new(crypto::generate_random_key().unwrap());
        (Vault::with_key(db, key).await.unwrap(), channel.id)
    }

    fn patch(channel_id: i64, tenant: i64) -> CredentialPatch {
        CredentialPatch {
            channel_id,
            tenant_id: tenant,
            external_account_id: "42".into(),
            api_key: Some("client-id".into()),
            api_secret: Some("client-secret".into()),
            access_token: Some("access-1".into()),
            refresh_token: Some("refresh-1".into()),
            token_expires_at: Some("2030-01-01T00:00:00.000Z".into()),
            redirect_uri: None,
        }
    }

    #[test]
    fn mask_secret_previews() {
        assert_eq!(mask_secret("sk-ant-REDACTED"), "sk-a...mnop");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("1234567890"), "1234...7890");
    }

    #[tokio::test]
    async fn save_encrypts_at_rest_and_load_decrypts() {
        let (vault, ch) = setup().await;
        let saved = vault.save(patch(ch, 1)).await.unwrap();
        assert_eq!(saved.access_token.expose_secret(), "access-1");

        let raw = credentials::get_credential(vault.database(), ch, 1)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(raw.access_token, "access-1");
        assert_ne!(raw.api_secret, "client-secret");

        let loaded = vault.load(ch, 1).await.unwrap();
        assert_eq!(loaded.api_secret.expose_secret(), "client-secret");
        assert_eq!(loaded.refresh_token.expose_secret(), "refresh-1");
        assert!(loaded.has_refresh_token());
    }

    #[tokio::test]
    async fn empty_account_id_rejected() {
        let (vault, ch) = setup().await;
        let mut p = patch(ch, 1);
        p.external_account_id = "  ".into();
        assert!(matches!(vault.save(p).await, Err(OmnichatError::Validation(_))));
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let (vault, ch) = setup().await;
        assert!(matches!(vault.load(ch, 9).await, Err(OmnichatError::VaultNotFound(_))));
        assert!(matches!(vault.load_by_id(77).await, Err(OmnichatError::VaultNotFound(_))));
    }

    #[tokio::test]
    async fn unconfigured_vault_refuses_io() {
        let db = Database::open(":memory:").await.unwrap();
        let vault = Vault::unconfigured(db);
        assert!(!vault.is_configured());
        assert!(matches!(vault.encrypt("x"), Err(OmnichatError::VaultUnconfigured)));
        assert!(matches!(vault.load(1, 1).await, Err(OmnichatError::VaultUnconfigured)));
    }

    #[tokio::test]
    async fn store_tokens_emits_rotation() {
        let (vault, ch) = setup().await;
        let saved = vault.save(patch(ch, 1)).await.unwrap();
        let mut rx = vault.subscribe();
        let rotated = vault
            .store_tokens(saved.id, "access-2", None, Some("2031-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        assert_eq!(rotated.access_token.expose_secret(), "access-2");
        assert_eq!(rotated.refresh_token.expose_secret(), "refresh-1");
        match rx.recv().await.unwrap() {
            CredentialEvent::Rotated {
                credential_id,
                token_expires_at,
                ..
            } => {
                assert_eq!(credential_id, saved.id);
                assert_eq!(token_expires_at.as_deref(), Some("2031-01-01T00:00:00.000Z"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn deactivate_hides_credential() {
        let (vault, ch) = setup().await;
        vault.save(patch(ch, 3)).await.unwrap();
        assert_eq!(vault.deactivate(ch, 3).await.unwrap(), 1);
        assert!(vault.load(ch, 3).await.is_err());
        assert!(vault.list_active(ch).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_key_on_reopen_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        let key = Zeroizing::new(crypto::generate_random_key().unwrap());
        Vault::with_key(db.clone(), key.clone()).await.unwrap();
        assert!(Vault::with_key(db.clone(), key).await.is_ok());

        let other = Zeroizing::new(crypto::generate_random_key().unwrap());
        assert!(matches!(
            Vault::with_key(db, other).await,
            Err(OmnichatError::VaultDecryptFailed(_))
        ));
    }

    #[tokio::test]
    async fn passphrase_derivation_is_stable_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        let config = VaultConfig {
            key: None,
            passphrase: Some("correct horse".into()),
            kdf_memory_cost: 32768,
            kdf_iterations: 2,
            kdf_parallelism: 1,
        };
        let first = Vault::from_config(db.clone(), &config).await.unwrap();
        let sealed = first.encrypt("token").unwrap();
        let second = Vault::from_config(db, &config).await.unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), "token");
    }

    #[tokio::test]
    async fn base64_key_must_be_32_bytes() {
        let db = Database::open(":memory:").await.unwrap();
        let config = VaultConfig {
            key: Some(STANDARD.encode([0u8; 16])),
            ..VaultConfig::default()
        };
        assert!(matches!(
            Vault::from_config(db, &config).await,
            Err(OmnichatError::Config(_))
        ));
    }
}
