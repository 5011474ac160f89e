// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component wiring shared by `serve` and `sync`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use omnichat_avito::AvitoFactory;
use omnichat_bus::MessageBus;
use omnichat_config::model::OmnichatConfig;
use omnichat_core::{ChannelType, IdentityResolver, MediaStore, OmnichatError, PlatformFactory, PlatformRegistry};
use omnichat_fanout::Fanout;
use omnichat_gateway::{AvitoConnect, GatewayState, IdentityChain, ServerConfig, TelegramConnect};
use omnichat_ingest::{EventRouter, TelegramUpdateHandler, WebhookIngestor};
use omnichat_outbound::{FsMediaStore, MediaFetcher, OutboundSender};
use omnichat_storage::Database;
use omnichat_storage::queries::channels;
use omnichat_sync::{HistorySync, SyncSettings};
use omnichat_telegram::{MediaGroups, PollSettings, PollingSupervisor, TelegramFactory, TelegramMedia};
use omnichat_token::{OAuthTokenClient, TokenManager};
use omnichat_vault::Vault;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Every long-lived component, built once from the configuration.
pub struct App {
    pub config: OmnichatConfig,
    pub db: Database,
    pub vault: Arc<Vault>,
    pub avito_channel_id: i64,
    pub telegram_channel_id: i64,
    pub platforms: Arc<dyn PlatformFactory>,
    pub telegram_factory: TelegramFactory,
    pub telegram_handler: Arc<TelegramUpdateHandler>,
    pub fanout: Arc<Fanout>,
    pub bus: MessageBus,
    pub ingestor: Arc<WebhookIngestor>,
    pub sender: Arc<OutboundSender>,
    pub history: Arc<HistorySync>,
    pub media: Arc<dyn MediaStore>,
    pub avito_connect: Arc<AvitoConnect>,
    pub telegram_connect: Arc<TelegramConnect>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("avito_channel_id", &self.avito_channel_id)
            .field("telegram_channel_id", &self.telegram_channel_id)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl App {
    pub async fn build(config: OmnichatConfig) -> Result<Self, OmnichatError> {
        let db = Database::from_config(&config.storage).await?;
        let vault = Arc::new(Vault::from_config(db.clone(), &config.vault).await?);
        let avito_channel = channels::ensure_channel(&db, ChannelType::Avito, "Avito").await?;
        let telegram_channel =
            channels::ensure_channel(&db, ChannelType::Telegram, "Telegram").await?;
        let public_base_url = config.service.public_base_url.trim_end_matches('/').to_string();
        let timeout = Duration::from_secs(config.http.timeout_secs);

        let token_client = OAuthTokenClient::new(&config.avito.api_base_url, timeout)?
            .with_app_credentials(config.avito.client_id.clone(), config.avito.client_secret.clone());
        let tokens = Arc::new(
            TokenManager::new(vault.clone()).with_endpoint(avito_channel.id, Arc::new(token_client)),
        );

        let media: Arc<dyn MediaStore> = Arc::new(FsMediaStore::from_config(&config.media));
        let avito_factory = AvitoFactory::from_config(&config.avito, &config.http, tokens.clone())?;
        let telegram_media = Arc::new(TelegramMedia::new(media.clone(), &public_base_url));
        let telegram_factory =
            TelegramFactory::from_config(&config.telegram, &config.http, tokens.clone(), telegram_media)?;
        let platforms: Arc<dyn PlatformFactory> = Arc::new(
            PlatformRegistry::new()
                .register(ChannelType::Avito, Arc::new(avito_factory.clone()))
                .register(ChannelType::Telegram, Arc::new(telegram_factory.clone())),
        );

        let bus = MessageBus::from_config(&config.bus, &config.http)?;
        let fanout = Arc::new(Fanout::new(config.gateway.max_ws_queue));
        let router = Arc::new(EventRouter::new(db.clone(), fanout.clone(), bus.clone()));
        let ingestor = Arc::new(
            WebhookIngestor::new(router.clone(), vault.clone(), platforms.clone())
                .with_webhook_secret(config.avito.webhook_secret.clone()),
        );
        let sender = Arc::new(OutboundSender::new(
            db.clone(),
            vault.clone(),
            platforms.clone(),
            media.clone(),
            MediaFetcher::from_config(&config.media, &config.http)?,
            fanout.clone(),
            bus.clone(),
            &public_base_url,
        ));
        let history = Arc::new(HistorySync::new(
            router.clone(),
            vault.clone(),
            platforms.clone(),
            SyncSettings::from(&config.sync),
        ));

        let telegram_handler = Arc::new(TelegramUpdateHandler::new(router, MediaGroups::new()));
        let avito_connect = Arc::new(AvitoConnect::new(
            avito_factory,
            tokens,
            avito_channel.id,
            &config.avito,
            &public_base_url,
        ));
        let telegram_connect = Arc::new(
            TelegramConnect::new(
                telegram_factory.clone(),
                telegram_handler.clone(),
                telegram_channel.id,
                &public_base_url,
            )
            .with_polling(config.telegram.polling)
            .with_webhook_secret(config.telegram.webhook_secret_token.clone()),
        );

        info!(
            avito_channel_id = avito_channel.id,
            telegram_channel_id = telegram_channel.id,
            bus = bus.is_enabled(),
            "components ready"
        );

        Ok(Self {
            config,
            db,
            vault,
            avito_channel_id: avito_channel.id,
            telegram_channel_id: telegram_channel.id,
            platforms,
            telegram_factory,
            telegram_handler,
            fanout,
            bus,
            ingestor,
            sender,
            history,
            media,
            avito_connect,
            telegram_connect,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.config.gateway.host.clone(),
            port: self.config.gateway.port,
        }
    }

    pub fn gateway_state(&self, shutdown: CancellationToken) -> Result<GatewayState, OmnichatError> {
        let identity: Arc<dyn IdentityResolver> =
            Arc::new(IdentityChain::from_config(&self.config.gateway, &self.config.http)?);
        Ok(GatewayState {
            db: self.db.clone(),
            vault: self.vault.clone(),
            platforms: self.platforms.clone(),
            identity,
            fanout: self.fanout.clone(),
            bus: self.bus.clone(),
            ingestor: self.ingestor.clone(),
            sender: self.sender.clone(),
            history: self.history.clone(),
            media: self.media.clone(),
            public_base_url: self.config.service.public_base_url.trim_end_matches('/').to_string(),
            avito: Some(self.avito_connect.clone()),
            telegram: Some(self.telegram_connect.clone()),
            started_at: Instant::now(),
            shutdown,
        })
    }

    /// Long-poll supervisor for every active bot; only built in polling mode.
    pub fn polling_supervisor(&self) -> Option<PollingSupervisor> {
        let telegram = &self.config.telegram;
        if !telegram.polling {
            return None;
        }
        let settings = PollSettings {
            poll_timeout_secs: telegram.poll_timeout_secs,
            ..PollSettings::default()
        };
        Some(PollingSupervisor::new(
            self.telegram_factory.clone(),
            self.telegram_channel_id,
            self.telegram_handler.clone(),
            settings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir, polling: bool) -> OmnichatConfig {
        let mut config = OmnichatConfig::default();
        config.storage.database_path = dir.path().join("omnichat.db").display().to_string();
        config.media.root = dir.path().join("media").display().to_string();
        config.vault.key = Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into());
        config.telegram.polling = polling;
        config
    }

    #[tokio::test]
    async fn build_registers_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(config(&dir, false)).await.unwrap();
        assert_ne!(app.avito_channel_id, app.telegram_channel_id);
        assert!(!app.bus.is_enabled());
        assert!(app.polling_supervisor().is_none());

        let state = app.gateway_state(CancellationToken::new()).unwrap();
        assert!(state.avito.is_some());
        assert!(state.telegram.is_some());
    }

    #[tokio::test]
    async fn polling_mode_builds_a_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(config(&dir, true)).await.unwrap();
        let supervisor = app.polling_supervisor().unwrap();
        assert!(supervisor.polled().is_empty());
    }
}
