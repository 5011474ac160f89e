// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion: envelope validation, credential lookup, routing.

use std::sync::Arc;

use omnichat_core::event::WebhookEnvelope;
use omnichat_core::types::{ChannelType, CredentialRef, MessageStatus, TenantId};
use omnichat_core::{OmnichatError, PlatformClient, PlatformFactory};
use omnichat_storage::queries::channels;
use omnichat_vault::Vault;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::router::{EventRouter, RouteContext, RouteOutcome};
use crate::signature;

/// Acknowledgement returned to the webhook caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created {
        chat_id: i64,
        message_id: i64,
    },
    /// The message was already stored; nothing was published.
    Existing {
        chat_id: i64,
        message_id: i64,
    },
    /// Extra album photo attached to an earlier message.
    Attached {
        message_id: i64,
    },
    StatusUpdated {
        chat_id: i64,
        message_id: i64,
        status: MessageStatus,
    },
    Typing {
        chat_id: i64,
    },
    Ignored {
        reason: String,
    },
    /// Processing failed after the payload was accepted. Logged, not retried.
    Failed {
        reason: String,
    },
}

impl IngestOutcome {
    pub fn success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl From<RouteOutcome> for IngestOutcome {
    fn from(outcome: RouteOutcome) -> Self {
        match outcome {
            RouteOutcome::Message(routed) if routed.created => Self::Created {
                chat_id: routed.chat.id,
                message_id: routed.message.id,
            },
            RouteOutcome::Message(routed) => Self::Existing {
                chat_id: routed.chat.id,
                message_id: routed.message.id,
            },
            RouteOutcome::Status {
                chat_id,
                message_id,
                status,
            } => Self::StatusUpdated {
                chat_id,
                message_id,
                status,
            },
            RouteOutcome::Typing { chat_id } => Self::Typing { chat_id },
            RouteOutcome::Ignored { reason } => Self::Ignored { reason },
        }
    }
}

/// Avito webhook entry point.
pub struct WebhookIngestor {
    router: Arc<EventRouter>,
    vault: Arc<Vault>,
    platforms: Arc<dyn PlatformFactory>,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for WebhookIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIngestor")
            .field("signed", &self.webhook_secret.is_some())
            .finish_non_exhaustive()
    }
}

impl WebhookIngestor {
    pub fn new(
        router: Arc<EventRouter>,
        vault: Arc<Vault>,
        platforms: Arc<dyn PlatformFactory>,
    ) -> Self {
        Self {
            router,
            vault,
            platforms,
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Check the `X-Avito-Signature` header. Always true without a secret.
    pub fn verify_signature(&self, body: &[u8], header: Option<&str>) -> bool {
        match &self.webhook_secret {
            Some(secret) => signature::verify_body_signature(secret, body, header),
            None => true,
        }
    }

    /// Process one raw webhook body for `tenant_id`.
    ///
    /// Malformed envelopes and missing credentials are errors for the caller.
    /// Failures after that point are logged and reported as
    /// [`IngestOutcome::Failed`] so the platform does not retry a payload
    /// that will never succeed.
    pub async fn ingest(
        &self,
        tenant_id: TenantId,
        body: &[u8],
    ) -> Result<IngestOutcome, OmnichatError> {
        let envelope = WebhookEnvelope::parse(body)?;
        let webhook_id = envelope.id.clone();
        let account_id = envelope.account_id();
        let kind = envelope.payload.kind.clone();
        let event = envelope.into_event()?;

        let Some(credential) = self.credential(tenant_id, account_id.as_deref()).await? else {
            // Direction is judged against the account id, so another
            // account's credential would misfile the message.
            warn!(webhook_id, kind, tenant_id, account_id = ?account_id, "no credential for webhook account");
            return Ok(IngestOutcome::Ignored {
                reason: format!(
                    "no credential for account {}",
                    account_id.as_deref().unwrap_or_default()
                ),
            });
        };
        let client: Option<Arc<dyn PlatformClient>> = match self.platforms.client_for(&credential) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(credential_id = credential.credential_id, error = %e, "no platform client for webhook");
                None
            }
        };

        let ctx = RouteContext::new(&credential, client.as_deref());
        match self.router.route(ctx, event).await {
            Ok(outcome) => {
                let outcome = IngestOutcome::from(outcome);
                info!(webhook_id, kind, tenant_id, ?outcome, "webhook processed");
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    webhook_id,
                    kind,
                    tenant_id,
                    credential_id = credential.credential_id,
                    error = %e,
                    "webhook processing failed"
                );
                Ok(IngestOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// The tenant's credential, narrowed to `account_id` when the event
    /// names one. `None` when that account has no credential.
    async fn credential(
        &self,
        tenant_id: TenantId,
        account_id: Option<&str>,
    ) -> Result<Option<CredentialRef>, OmnichatError> {
        let channel = channels::get_channel_by_type(self.vault.database(), ChannelType::Avito)
            .await?
            .ok_or_else(|| OmnichatError::NotFound {
                entity: "channel",
                id: ChannelType::Avito.to_string(),
            })?;
        let view = match account_id {
            Some(account) => {
                match self
                    .vault
                    .load_for_account(channel.id, tenant_id, account)
                    .await
                {
                    Ok(view) => view,
                    Err(OmnichatError::VaultNotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            None => self.vault.load(channel.id, tenant_id).await?,
        };
        Ok(Some(view.credential_ref(ChannelType::Avito)))
    }
}
