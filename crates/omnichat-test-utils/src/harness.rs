// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` wires storage, vault, router, ingestor, sender, fanout and
//! bus against a temp SQLite database and mock platforms. Tenant 1 owns an
//! Avito credential for account `42` and a Telegram credential for bot
//! `555000`.

use std::sync::Arc;
use std::time::Duration;

use omnichat_bus::MessageBus;
use omnichat_core::types::{ChannelType, CredentialRef, TenantId};
use omnichat_core::{OmnichatError, PlatformFactory};
use omnichat_fanout::Fanout;
use omnichat_ingest::{EventRouter, WebhookIngestor};
use omnichat_outbound::{MediaFetcher, OutboundSender};
use omnichat_storage::Database;
use omnichat_storage::queries::channels;
use omnichat_vault::{CredentialPatch, Vault};
use zeroize::Zeroizing;

use crate::memory::{MemoryBus, MemoryMediaStore};
use crate::mock_platform::{MockPlatform, MockPlatformFactory};

pub const TENANT: TenantId = 1;
pub const AVITO_ACCOUNT: &str = "42";
pub const TELEGRAM_BOT: &str = "555000";
pub const PUBLIC_BASE_URL: &str = "https://chat.example.com";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    latency: Duration,
    max_media_bytes: usize,
    dedup_window: Option<Duration>,
    webhook_secret: Option<String>,
    ws_queue: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            max_media_bytes: omnichat_core::traits::platform::MAX_MEDIA_BYTES,
            dedup_window: None,
            webhook_secret: None,
            ws_queue: 64,
        }
    }

    /// Delay every mock `list_messages` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_max_media_bytes(mut self, max: usize) -> Self {
        self.max_media_bytes = max;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhook_secret = Some(secret.to_string());
        self
    }

    /// Per-socket frame queue of the fanout.
    pub fn with_ws_queue(mut self, size: usize) -> Self {
        self.ws_queue = size;
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, OmnichatError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| OmnichatError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let avito_channel = channels::ensure_channel(&db, ChannelType::Avito, "Avito").await?;
        let telegram_channel =
            channels::ensure_channel(&db, ChannelType::Telegram, "Telegram").await?;

        let vault = Arc::new(Vault::with_key(db.clone(), Zeroizing::new([7u8; 32])).await?);
        let avito_view = vault
            .save(CredentialPatch {
                channel_id: avito_channel.id,
                tenant_id: TENANT,
                external_account_id: AVITO_ACCOUNT.into(),
                api_key: Some("client-id".into()),
                api_secret: Some("client-secret".into()),
                access_token: Some("avito-token".into()),
                token_expires_at: Some(omnichat_core::time::format(
                    chrono::Utc::now() + chrono::Duration::hours(24),
                )),
                ..CredentialPatch::default()
            })
            .await?;
        let telegram_view = vault
            .save(CredentialPatch {
                channel_id: telegram_channel.id,
                tenant_id: TENANT,
                external_account_id: TELEGRAM_BOT.into(),
                access_token: Some("123:abc".into()),
                ..CredentialPatch::default()
            })
            .await?;

        let avito = Arc::new(MockPlatform::new(ChannelType::Avito, AVITO_ACCOUNT).with_latency(self.latency));
        let telegram = Arc::new(MockPlatform::new(ChannelType::Telegram, TELEGRAM_BOT));
        let platforms = Arc::new(
            MockPlatformFactory::new()
                .with(avito.clone())
                .with(telegram.clone()),
        );

        let bus = Arc::new(MemoryBus::new());
        let message_bus = MessageBus::new(bus.clone());
        let fanout = Arc::new(Fanout::new(self.ws_queue));
        let router = Arc::new(EventRouter::new(db.clone(), fanout.clone(), message_bus.clone()));
        let ingestor = Arc::new(
            WebhookIngestor::new(
                router.clone(),
                vault.clone(),
                platforms.clone() as Arc<dyn PlatformFactory>,
            )
            .with_webhook_secret(self.webhook_secret),
        );

        let media = Arc::new(MemoryMediaStore::new());
        let fetcher = MediaFetcher::new(Duration::from_secs(5), self.max_media_bytes)?;
        let mut sender = OutboundSender::new(
            db.clone(),
            vault.clone(),
            platforms.clone(),
            media.clone(),
            fetcher,
            fanout.clone(),
            message_bus.clone(),
            PUBLIC_BASE_URL,
        );
        if let Some(window) = self.dedup_window {
            sender = sender.with_dedup_window(window);
        }

        Ok(TestHarness {
            db,
            vault,
            avito_channel_id: avito_channel.id,
            telegram_channel_id: telegram_channel.id,
            avito_credential: avito_view.credential_ref(ChannelType::Avito),
            telegram_credential: telegram_view.credential_ref(ChannelType::Telegram),
            avito,
            telegram,
            platforms,
            bus,
            message_bus,
            fanout,
            router,
            ingestor,
            sender: Arc::new(sender),
            media,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete chat core against a temp database and mock platforms.
pub struct TestHarness {
    pub db: Database,
    pub vault: Arc<Vault>,
    pub avito_channel_id: i64,
    pub telegram_channel_id: i64,
    pub avito_credential: CredentialRef,
    pub telegram_credential: CredentialRef,
    pub avito: Arc<MockPlatform>,
    pub telegram: Arc<MockPlatform>,
    pub platforms: Arc<MockPlatformFactory>,
    pub bus: Arc<MemoryBus>,
    pub message_bus: MessageBus,
    pub fanout: Arc<Fanout>,
    pub router: Arc<EventRouter>,
    pub ingestor: Arc<WebhookIngestor>,
    pub sender: Arc<OutboundSender>,
    pub media: Arc<MemoryMediaStore>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, OmnichatError> {
        Self::builder().build().await
    }
}
