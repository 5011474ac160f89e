// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-polling workers for bots that do not receive webhooks.
//!
//! One task per active credential calls `getUpdates` with offset tracking.
//! The supervisor re-reads active credentials periodically, starting
//! pollers for new bots and cancelling pollers for removed ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omnichat_core::OmnichatError;
use omnichat_core::types::{ChannelType, CredentialRef};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{TelegramClient, TelegramFactory};

/// Consumer of raw updates, implemented by the event pipeline.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle_update(&self, client: &TelegramClient, update: Value)
    -> Result<(), OmnichatError>;
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_timeout_secs: u64,
    pub limit: u32,
    /// Pause after a failed `getUpdates`.
    pub error_backoff: Duration,
    /// How often the supervisor re-reads active credentials.
    pub refresh_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 25,
            limit: 100,
            error_backoff: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(60),
        }
    }
}

/// Poll one bot until cancelled. Returns the next offset it would request.
pub async fn poll_bot(
    client: TelegramClient,
    handler: Arc<dyn UpdateHandler>,
    settings: PollSettings,
    cancel: CancellationToken,
) -> Option<i64> {
    let credential_id = client.credential().credential_id;
    if let Err(e) = client.delete_webhook().await {
        warn!(credential_id, error = %e, "failed to delete webhook before polling");
    }
    info!(credential_id, "telegram poller started");

    let mut offset: Option<i64> = None;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.get_updates(offset, settings.poll_timeout_secs, settings.limit) => result,
        };
        match result {
            Ok(updates) => {
                debug!(credential_id, count = updates.len(), "received updates");
                for update in updates {
                    if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                        offset = Some(id + 1);
                    }
                    if let Err(e) = handler.handle_update(&client, update).await {
                        warn!(credential_id, error = %e, "failed to handle telegram update");
                    }
                }
            }
            Err(e) => {
                warn!(credential_id, error = %e, "getUpdates failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.error_backoff) => {}
                }
            }
        }
    }
    info!(credential_id, "telegram poller stopped");
    offset
}

/// Keeps one poller running per active Telegram credential.
pub struct PollingSupervisor {
    factory: TelegramFactory,
    channel_id: i64,
    handler: Arc<dyn UpdateHandler>,
    settings: PollSettings,
    running: HashMap<i64, (CancellationToken, JoinHandle<Option<i64>>)>,
}

impl PollingSupervisor {
    pub fn new(
        factory: TelegramFactory,
        channel_id: i64,
        handler: Arc<dyn UpdateHandler>,
        settings: PollSettings,
    ) -> Self {
        Self {
            factory,
            channel_id,
            handler,
            settings,
            running: HashMap::new(),
        }
    }

    /// Credential ids currently polled.
    pub fn polled(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.running.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Reconcile running pollers with the active credentials.
    pub async fn sync_once(&mut self, parent: &CancellationToken) -> Result<(), OmnichatError> {
        let active = self
            .factory
            .tokens()
            .vault()
            .list_active(self.channel_id)
            .await?;
        let wanted: HashMap<i64, CredentialRef> = active
            .iter()
            .filter(|c| c.has_access_token())
            .map(|c| (c.id, c.credential_ref(ChannelType::Telegram)))
            .collect();

        let stale: Vec<i64> = self
            .running
            .iter()
            .filter(|(id, (_, handle))| !wanted.contains_key(id) || handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some((token, _)) = self.running.remove(&id) {
                debug!(credential_id = id, "stopping telegram poller");
                token.cancel();
            }
        }

        for (id, credential) in wanted {
            if self.running.contains_key(&id) {
                continue;
            }
            let token = parent.child_token();
            let handle = tokio::spawn(poll_bot(
                self.factory.client(&credential),
                self.handler.clone(),
                self.settings.clone(),
                token.clone(),
            ));
            self.running.insert(id, (token, handle));
        }
        Ok(())
    }

    /// Reconcile every `refresh_interval` until cancelled, then stop all
    /// pollers.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if let Err(e) = self.sync_once(&cancel).await {
                warn!(error = %e, "failed to refresh telegram pollers");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.refresh_interval) => {}
            }
        }
        for (_, (token, handle)) in self.running.drain() {
            token.cancel();
            let _ = handle.await;
        }
        info!("telegram polling supervisor stopped");
    }
}
