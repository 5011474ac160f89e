// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OmnichatConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential vault cipher key.
    #[serde(default)]
    pub vault: VaultConfig,

    /// REST and WebSocket listener.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Avito-style messenger integration.
    #[serde(default)]
    pub avito: AvitoConfig,

    /// Telegram bot integration.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// External message broker.
    #[serde(default)]
    pub bus: BusConfig,

    /// Object store for attachments.
    #[serde(default)]
    pub media: MediaConfig,

    /// History synchronizer tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Absolute base URL this service is reachable at. Used to turn
    /// object-store keys into links and to build default webhook URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("omnichat").join("omnichat.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("omnichat.db"))
        .display()
        .to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Credential vault key material.
///
/// Exactly one of `key` (base64, 32 bytes) or `passphrase` should be set.
/// A passphrase is stretched with Argon2id using a salt stored in the
/// database.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// Argon2id memory cost in KiB.
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism degree.
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key: None,
            passphrase: None,
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("key", &self.key.as_ref().map(|_| "[redacted]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[redacted]"))
            .field("kdf_memory_cost", &self.kdf_memory_cost)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("kdf_parallelism", &self.kdf_parallelism)
            .finish()
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Outbound frame queue per WebSocket connection.
    #[serde(default = "default_max_ws_queue")]
    pub max_ws_queue: usize,

    /// External token-to-identity resolver. Takes precedence over `operators`.
    #[serde(default)]
    pub identity_url: Option<String>,

    /// Static operator tokens for deployments without an identity service.
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_ws_queue: default_max_ws_queue(),
            identity_url: None,
            operators: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_ws_queue() -> usize {
    64
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    pub token: String,
    pub user_id: i64,
    pub tenant_id: i64,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl std::fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("tenant_id", &self.tenant_id)
            .field("is_owner", &self.is_owner)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AvitoConfig {
    /// OAuth application client id.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth application client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// API root; the messenger lives under `/messenger`, tokens under `/token/`.
    #[serde(default = "default_avito_api_base_url")]
    pub api_base_url: String,

    /// Browser authorization page for the OAuth redirect flow.
    #[serde(default = "default_avito_authorize_url")]
    pub authorize_url: String,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// HMAC secret for `X-Avito-Signature`. Unset disables the check.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Credential seeded at startup.
    #[serde(default)]
    pub bootstrap: Option<AvitoBootstrapConfig>,
}

impl Default for AvitoConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: default_avito_api_base_url(),
            authorize_url: default_avito_authorize_url(),
            redirect_uri: None,
            webhook_secret: None,
            bootstrap: None,
        }
    }
}

impl std::fmt::Debug for AvitoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvitoConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("api_base_url", &self.api_base_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .field("bootstrap", &self.bootstrap.as_ref().map(|b| b.tenant_id))
            .finish()
    }
}

fn default_avito_api_base_url() -> String {
    "https://api.avito.ru".to_string()
}

fn default_avito_authorize_url() -> String {
    "https://avito.ru/oauth".to_string()
}

/// Personal-grant credential created or refreshed at startup.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AvitoBootstrapConfig {
    pub tenant_id: i64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Register `{public_base_url}/chats/avito/webhooks/{tenant}` after connecting.
    #[serde(default = "default_true")]
    pub register_webhook: bool,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,

    /// Long-poll `getUpdates` instead of receiving webhooks.
    #[serde(default)]
    pub polling: bool,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    #[serde(default)]
    pub webhook_secret_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_telegram_api_base_url(),
            polling: false,
            poll_timeout_secs: default_poll_timeout_secs(),
            webhook_secret_token: None,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base_url", &self.api_base_url)
            .field("polling", &self.polling)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field(
                "webhook_secret_token",
                &self.webhook_secret_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    25
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Broker management API root, e.g. `http://rabbitmq:15672`.
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    #[serde(default = "default_vhost")]
    pub vhost: String,

    #[serde(default = "default_exchange")]
    pub exchange: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_url: default_broker_url(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConfig")
            .field("enabled", &self.enabled)
            .field("broker_url", &self.broker_url)
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn default_broker_url() -> String {
    "http://127.0.0.1:15672".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Filesystem root of the object store.
    #[serde(default = "default_media_root")]
    pub root: String,

    /// Upper bound for a single attachment, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_media_root() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("omnichat").join("media"))
        .unwrap_or_else(|| std::path::PathBuf::from("media"))
        .display()
        .to_string()
}

fn default_max_bytes() -> usize {
    24 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Per-chat tasks running at once.
    #[serde(default = "default_sync_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Platform cap on chat listing offsets.
    #[serde(default = "default_offset_cap")]
    pub offset_cap: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_sync_concurrency(),
            page_size: default_page_size(),
            offset_cap: default_offset_cap(),
        }
    }
}

fn default_sync_concurrency() -> usize {
    10
}

fn default_page_size() -> u32 {
    100
}

fn default_offset_cap() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Timeout applied to every outbound platform call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
