// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential rows. Values are stored exactly as given; encryption is the
//! vault's job and the vault is the only caller of the write functions.

use omnichat_core::OmnichatError;
use omnichat_core::types::{StoredCredential, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::CredentialWrite;

const COLUMNS: &str = "id, channel_id, tenant_id, api_key, api_secret, access_token, refresh_token, \
                       token_expires_at, external_account_id, redirect_uri, active, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredCredential> {
    Ok(StoredCredential {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        tenant_id: row.get(2)?,
        api_key: row.get(3)?,
        api_secret: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        token_expires_at: row.get(7)?,
        external_account_id: row.get(8)?,
        redirect_uri: row.get(9)?,
        active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Most recently updated active credential of a tenant on a channel.
pub async fn get_credential(
    db: &Database,
    channel_id: i64,
    tenant_id: TenantId,
) -> Result<Option<StoredCredential>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Option<StoredCredential>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM channel_credentials
                     WHERE channel_id = ?1 AND tenant_id = ?2 AND active = 1
                     ORDER BY updated_at DESC, id DESC LIMIT 1"
                ),
                params![channel_id, tenant_id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active credential acting as `external_account_id`.
pub async fn get_credential_for_account(
    db: &Database,
    channel_id: i64,
    tenant_id: TenantId,
    external_account_id: &str,
) -> Result<Option<StoredCredential>, OmnichatError> {
    let account = external_account_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<StoredCredential>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM channel_credentials
                     WHERE channel_id = ?1 AND tenant_id = ?2 AND external_account_id = ?3 AND active = 1"
                ),
                params![channel_id, tenant_id, account],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_credential_by_id(
    db: &Database,
    id: i64,
) -> Result<Option<StoredCredential>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Option<StoredCredential>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channel_credentials WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All active credentials on a channel, across tenants.
pub async fn list_active_credentials(
    db: &Database,
    channel_id: i64,
) -> Result<Vec<StoredCredential>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Vec<StoredCredential>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM channel_credentials
                 WHERE channel_id = ?1 AND active = 1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![channel_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or update the active credential for
/// `(channel_id, tenant_id, external_account_id)`.
///
/// `None` fields keep their stored value on update and default to empty on
/// insert. `updated_at` is always bumped.
pub async fn upsert_credential(
    db: &Database,
    write: &CredentialWrite,
) -> Result<StoredCredential, OmnichatError> {
    let w = write.clone();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<StoredCredential, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM channel_credentials
                     WHERE channel_id = ?1 AND tenant_id = ?2 AND external_account_id = ?3 AND active = 1",
                    params![w.channel_id, w.tenant_id, w.external_account_id],
                    |r| r.get(0),
                )
                .optional()?;

            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE channel_credentials SET
                            api_key = COALESCE(?2, api_key),
                            api_secret = COALESCE(?3, api_secret),
                            access_token = COALESCE(?4, access_token),
                            refresh_token = COALESCE(?5, refresh_token),
                            token_expires_at = COALESCE(?6, token_expires_at),
                            redirect_uri = COALESCE(?7, redirect_uri),
                            updated_at = ?8
                         WHERE id = ?1",
                        params![
                            id,
                            w.api_key,
                            w.api_secret,
                            w.access_token,
                            w.refresh_token,
                            w.token_expires_at,
                            w.redirect_uri,
                            now,
                        ],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO channel_credentials
                            (channel_id, tenant_id, api_key, api_secret, access_token, refresh_token,
                             token_expires_at, external_account_id, redirect_uri, active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
                        params![
                            w.channel_id,
                            w.tenant_id,
                            w.api_key.unwrap_or_default(),
                            w.api_secret.unwrap_or_default(),
                            w.access_token.unwrap_or_default(),
                            w.refresh_token.unwrap_or_default(),
                            w.token_expires_at,
                            w.external_account_id,
                            w.redirect_uri,
                            now,
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            let row = tx.query_row(
                &format!("SELECT {COLUMNS} FROM channel_credentials WHERE id = ?1"),
                params![id],
                from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Replace the token pair and expiry in one statement.
///
/// `refresh_token = None` keeps the stored refresh token.
pub async fn update_tokens(
    db: &Database,
    id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    token_expires_at: Option<&str>,
) -> Result<StoredCredential, OmnichatError> {
    let access = access_token.to_string();
    let refresh = refresh_token.map(str::to_string);
    let expires = token_expires_at.map(str::to_string);
    let now = omnichat_core::time::now();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<StoredCredential>, rusqlite::Error> {
            let n = conn.execute(
                "UPDATE channel_credentials SET
                    access_token = ?2,
                    refresh_token = COALESCE(?3, refresh_token),
                    token_expires_at = ?4,
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, access, refresh, expires, now],
            )?;
            if n == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channel_credentials WHERE id = ?1"),
                params![id],
                from_row,
            )
            .map(Some)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    row.ok_or_else(|| OmnichatError::VaultNotFound(format!("credential {id}")))
}

/// Soft-deactivate every active credential of a tenant on a channel.
pub async fn deactivate_credentials(
    db: &Database,
    channel_id: i64,
    tenant_id: TenantId,
) -> Result<usize, OmnichatError> {
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE channel_credentials SET active = 0, updated_at = ?3
                 WHERE channel_id = ?1 AND tenant_id = ?2 AND active = 1",
                params![channel_id, tenant_id, now],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::db_with_channel;

    fn write(channel_id: i64, tenant: i64, account: &str) -> CredentialWrite {
        CredentialWrite {
            channel_id,
            tenant_id: tenant,
            external_account_id: account.to_string(),
            access_token: Some("ct-access".into()),
            refresh_token: Some("ct-refresh".into()),
            token_expires_at: Some("2030-01-01T00:00:00.000Z".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates_same_account() {
        let (db, ch) = db_with_channel().await;
        let first = upsert_credential(&db, &write(ch, 1, "42")).await.unwrap();
        let mut patch = write(ch, 1, "42");
        patch.access_token = Some("ct-access-2".into());
        patch.refresh_token = None;
        let second = upsert_credential(&db, &patch).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.access_token, "ct-access-2");
        assert_eq!(second.refresh_token, "ct-refresh");
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn tenant_may_hold_two_accounts() {
        let (db, ch) = db_with_channel().await;
        let a = upsert_credential(&db, &write(ch, 1, "42")).await.unwrap();
        let b = upsert_credential(&db, &write(ch, 1, "43")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(list_active_credentials(&db, ch).await.unwrap().len(), 2);
        let found = get_credential_for_account(&db, ch, 1, "43").await.unwrap().unwrap();
        assert_eq!(found.id, b.id);
    }

    #[tokio::test]
    async fn update_tokens_keeps_refresh_when_absent() {
        let (db, ch) = db_with_channel().await;
        let cred = upsert_credential(&db, &write(ch, 1, "42")).await.unwrap();
        let updated = update_tokens(&db, cred.id, "new", None, Some("2031-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        assert_eq!(updated.access_token, "new");
        assert_eq!(updated.refresh_token, "ct-refresh");
        assert_eq!(updated.token_expires_at.as_deref(), Some("2031-01-01T00:00:00.000Z"));

        let missing = update_tokens(&db, 999, "x", None, None).await;
        assert!(matches!(missing, Err(OmnichatError::VaultNotFound(_))));
    }

    #[tokio::test]
    async fn deactivate_hides_credential() {
        let (db, ch) = db_with_channel().await;
        upsert_credential(&db, &write(ch, 5, "42")).await.unwrap();
        assert_eq!(deactivate_credentials(&db, ch, 5).await.unwrap(), 1);
        assert!(get_credential(&db, ch, 5).await.unwrap().is_none());
        // A new active credential may now be created for the same account.
        let again = upsert_credential(&db, &write(ch, 5, "42")).await.unwrap();
        assert!(again.active);
    }
}
