// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backfill of a tenant's remote chats through the event router.
//!
//! Chats are listed page by page up to the platform's offset cap, filtered by
//! `since`, then handed to a bounded pool of per-chat tasks. Every message
//! goes through [`EventRouter::route_message`], so replays are idempotent and
//! contact harvesting matches the webhook path.

use std::sync::Arc;

use omnichat_config::model::SyncConfig;
use omnichat_core::event::MessageEvent;
use omnichat_core::types::{ChannelType, ChatListQuery, CredentialRef, MessageSource, RemoteChat, TenantId};
use omnichat_core::{OmnichatError, PlatformClient, PlatformFactory};
use omnichat_ingest::{ChatHints, EventRouter, RouteContext};
use omnichat_storage::queries::channels;
use omnichat_vault::Vault;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::summary::{ChatReport, SyncSummary};

/// Fully old pages in a row after which message paging stops.
const OLD_PAGE_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub concurrency: usize,
    pub page_size: u32,
    pub offset_cap: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            page_size: config.page_size.max(1),
            offset_cap: config.offset_cap,
        }
    }
}

/// Keep a chat when it, or its newest message, is at or after `since`.
pub fn is_recent(chat: &RemoteChat, since: i64) -> bool {
    let created = chat.created.unwrap_or(0);
    let last = chat.last_message.as_ref().map_or(0, |m| m.created);
    created >= since || last >= since
}

pub struct HistorySync {
    router: Arc<EventRouter>,
    vault: Arc<Vault>,
    platforms: Arc<dyn PlatformFactory>,
    settings: SyncSettings,
}

impl std::fmt::Debug for HistorySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistorySync")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl HistorySync {
    pub fn new(
        router: Arc<EventRouter>,
        vault: Arc<Vault>,
        platforms: Arc<dyn PlatformFactory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            router,
            vault,
            platforms,
            settings,
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Sync the tenant's Avito account.
    pub async fn run(
        &self,
        tenant_id: TenantId,
        since: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<SyncSummary, OmnichatError> {
        let channel = channels::get_channel_by_type(self.vault.database(), ChannelType::Avito)
            .await?
            .ok_or_else(|| OmnichatError::NotFound {
                entity: "channel",
                id: ChannelType::Avito.to_string(),
            })?;
        let view = self.vault.load(channel.id, tenant_id).await?;
        let credential = view.credential_ref(channel.channel_type);
        let client = self.platforms.client_for(&credential)?;
        self.sync_account(credential, client, since, cancel).await
    }

    /// Sync every chat visible to `client`.
    ///
    /// Fails only when the very first chat page cannot be listed; later
    /// failures are collected in the summary.
    pub async fn sync_account(
        &self,
        credential: CredentialRef,
        client: Arc<dyn PlatformClient>,
        since: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<SyncSummary, OmnichatError> {
        let mut summary = SyncSummary::default();
        let chats = self
            .list_chats(client.as_ref(), since, &mut summary)
            .await?;
        info!(
            tenant_id = credential.tenant_id,
            credential_id = credential.credential_id,
            chats = chats.len(),
            skipped = summary.chats_skipped,
            "history sync started"
        );

        let credential = Arc::new(credential);
        let permits = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut tasks = JoinSet::new();
        for chat in chats {
            let router = self.router.clone();
            let credential = credential.clone();
            let client = client.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let page_size = self.settings.page_size;
            tasks.spawn(async move {
                let external_chat_id = chat.id.clone();
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return (external_chat_id, Err(SyncError::Cancelled)),
                    permit = permits.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (external_chat_id, Err(SyncError::Cancelled));
                };
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(SyncError::Cancelled),
                    result = sync_chat(&router, &credential, client.as_ref(), &chat, since, page_size) => {
                        result.map_err(SyncError::Failed)
                    }
                };
                (external_chat_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.record(report),
                Ok((chat, Err(SyncError::Failed(e)))) => {
                    warn!(external_chat_id = %chat, error = %e, "chat sync failed");
                    summary.fail(&chat, e);
                }
                Ok((chat, Err(SyncError::Cancelled))) => {
                    debug!(external_chat_id = %chat, "chat sync cancelled");
                }
                Err(e) => summary.errors.push(format!("sync task failed: {e}")),
            }
        }

        info!(
            tenant_id = credential.tenant_id,
            chats_processed = summary.chats_processed,
            messages_created = summary.messages_created,
            errors = summary.errors.len(),
            "history sync finished"
        );
        Ok(summary)
    }

    async fn list_chats(
        &self,
        client: &dyn PlatformClient,
        since: Option<i64>,
        summary: &mut SyncSummary,
    ) -> Result<Vec<RemoteChat>, OmnichatError> {
        let limit = self.settings.page_size;
        let mut offset = 0;
        let mut kept = Vec::new();
        loop {
            let query = ChatListQuery {
                limit,
                offset,
                ..ChatListQuery::default()
            };
            let page = match client.list_chats(&query).await {
                Ok(page) => page,
                Err(e) if offset == 0 => return Err(e),
                Err(e) => {
                    warn!(offset, error = %e, "chat listing stopped early");
                    summary.errors.push(format!("chat listing at offset {offset}: {e}"));
                    break;
                }
            };
            let len = page.len();
            for chat in page {
                match since {
                    Some(since) if !is_recent(&chat, since) => summary.chats_skipped += 1,
                    _ => kept.push(chat),
                }
            }
            if len < limit as usize {
                break;
            }
            offset += limit;
            if offset >= self.settings.offset_cap {
                debug!(offset, "chat listing reached the offset cap");
                break;
            }
        }
        Ok(kept)
    }
}

enum SyncError {
    Cancelled,
    Failed(OmnichatError),
}

async fn sync_chat(
    router: &EventRouter,
    credential: &CredentialRef,
    client: &dyn PlatformClient,
    chat: &RemoteChat,
    since: Option<i64>,
    page_size: u32,
) -> Result<ChatReport, OmnichatError> {
    let ctx = RouteContext::new(credential, Some(client)).with_source(MessageSource::Api);
    let hints = ChatHints::from_remote(chat, &credential.external_account_id);
    let upsert = router.resolve_chat(ctx, &chat.id, hints).await?;
    let mut report = ChatReport {
        chat_created: upsert.created,
        chat_updated: upsert.updated,
        ..ChatReport::default()
    };

    let mut offset = 0;
    let mut old_pages = 0;
    loop {
        let page = match client.list_messages(&chat.id, page_size, offset).await {
            Ok(page) => page,
            Err(OmnichatError::SubscriptionRequired { message }) => {
                debug!(external_chat_id = %chat.id, reason = %message, "message history needs a subscription");
                if let Some(last) = &chat.last_message {
                    let mut last = last.clone();
                    if last.chat_id.is_empty() {
                        last.chat_id = chat.id.clone();
                    }
                    if since.is_none_or(|s| last.created >= s) {
                        ingest(router, ctx, &chat.id, &last, &mut report).await;
                    }
                }
                break;
            }
            Err(e) => return Err(e),
        };
        let len = page.len();
        let fresh: Vec<&MessageEvent> = page
            .iter()
            .filter(|m| since.is_none_or(|s| m.created >= s))
            .collect();

        if fresh.is_empty() && since.is_some() {
            old_pages += 1;
        } else {
            old_pages = 0;
        }
        // Pages are newest first; store oldest first.
        for event in fresh.into_iter().rev() {
            ingest(router, ctx, &chat.id, event, &mut report).await;
        }

        if len < page_size as usize || old_pages >= OLD_PAGE_LIMIT {
            break;
        }
        offset += page_size;
    }
    Ok(report)
}

/// Route one history message. A failure is recorded and the rest of the
/// chat still loads.
async fn ingest(
    router: &EventRouter,
    ctx: RouteContext<'_>,
    external_chat_id: &str,
    event: &MessageEvent,
    report: &mut ChatReport,
) {
    match router.route_message(ctx, event, ChatHints::default()).await {
        Ok(routed) => {
            report.messages_loaded += 1;
            if routed.created {
                report.messages_created += 1;
            } else {
                report.messages_updated += 1;
            }
        }
        Err(e) => {
            warn!(%external_chat_id, external_message_id = %event.id, error = %e, "history message skipped");
            report
                .message_errors
                .push(format!("chat {external_chat_id}: message {}: {e}", event.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(created: Option<i64>, last: Option<i64>) -> RemoteChat {
        RemoteChat {
            id: "c".into(),
            created,
            last_message: last.map(|created| MessageEvent {
                created,
                ..MessageEvent::default()
            }),
            ..RemoteChat::default()
        }
    }

    #[test]
    fn recent_by_creation_or_last_message() {
        assert!(is_recent(&chat(Some(200), None), 100));
        assert!(is_recent(&chat(Some(50), Some(150)), 100));
        assert!(is_recent(&chat(Some(100), None), 100));
        assert!(!is_recent(&chat(Some(50), Some(60)), 100));
        assert!(!is_recent(&chat(None, None), 100));
    }

    #[test]
    fn settings_never_zero() {
        let settings = SyncSettings::from(&SyncConfig {
            concurrency: 0,
            page_size: 0,
            offset_cap: 1000,
        });
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.page_size, 1);
    }
}
