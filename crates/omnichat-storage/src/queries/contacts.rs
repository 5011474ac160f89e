// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contacts shared between chats of the same external identity.

use omnichat_core::OmnichatError;
use omnichat_core::types::ChatContact;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

const COLUMNS: &str = "id, channel_id, external_contact_id, name, phone, avatar";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatContact> {
    Ok(ChatContact {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        external_contact_id: row.get(2)?,
        name: row.get(3)?,
        phone: row.get(4)?,
        avatar: row.get(5)?,
    })
}

const FILL_EMPTY: &str = "UPDATE chat_contacts SET
    name = CASE WHEN name IS NULL OR name = '' THEN COALESCE(?2, name) ELSE name END,
    phone = CASE WHEN phone IS NULL OR phone = '' THEN COALESCE(?3, phone) ELSE phone END,
    avatar = CASE WHEN avatar IS NULL OR avatar = '' THEN COALESCE(?4, avatar) ELSE avatar END,
    updated_at = ?5
 WHERE id = ?1";

/// Find the contact for a platform user id, creating it if missing and
/// filling empty fields otherwise.
pub async fn upsert_contact_by_external(
    db: &Database,
    channel_id: i64,
    external_contact_id: &str,
    name: Option<String>,
    phone: Option<String>,
    avatar: Option<String>,
) -> Result<ChatContact, OmnichatError> {
    let ext = external_contact_id.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<ChatContact, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM chat_contacts WHERE channel_id = ?1 AND external_contact_id = ?2",
                    params![channel_id, ext],
                    |r| r.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    tx.execute(FILL_EMPTY, params![id, name, phone, avatar, now])?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO chat_contacts
                            (channel_id, external_contact_id, name, phone, avatar, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![channel_id, ext, name, phone, avatar, now],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            let contact = tx.query_row(
                &format!("SELECT {COLUMNS} FROM chat_contacts WHERE id = ?1"),
                params![id],
                from_row,
            )?;
            tx.commit()?;
            Ok(contact)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a contact on the channel by normalised phone, or create one.
pub async fn find_or_create_by_phone(
    db: &Database,
    channel_id: i64,
    phone: &str,
    name: Option<String>,
) -> Result<ChatContact, OmnichatError> {
    let phone = phone.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<ChatContact, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM chat_contacts WHERE channel_id = ?1 AND phone = ?2
                     ORDER BY id LIMIT 1",
                    params![channel_id, phone],
                    |r| r.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    tx.execute(FILL_EMPTY, params![id, name, None::<String>, None::<String>, now])?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO chat_contacts (channel_id, name, phone, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![channel_id, name, phone, now],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            let contact = tx.query_row(
                &format!("SELECT {COLUMNS} FROM chat_contacts WHERE id = ?1"),
                params![id],
                from_row,
            )?;
            tx.commit()?;
            Ok(contact)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_contact(db: &Database, id: i64) -> Result<Option<ChatContact>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Option<ChatContact>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM chat_contacts WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
