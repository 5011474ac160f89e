// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rows and the chat aggregates they drive.

use omnichat_core::OmnichatError;
use omnichat_core::types::{ChatMessage, MessageStatus, NewMessage, SenderType};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{MessageInsert, MessageUpdate, OperatorDraft, OperatorInsert};
use crate::queries::enum_col;

const COLUMNS: &str = "id, chat_id, sender_type, content, message_type, external_message_id, \
                       status, source, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_type: enum_col(row, 2)?,
        content: row.get(3)?,
        message_type: enum_col(row, 4)?,
        external_message_id: row.get(5)?,
        status: enum_col(row, 6)?,
        source: enum_col(row, 7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn select_by_id(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<ChatMessage>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM chat_messages WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

fn select_by_external(
    conn: &rusqlite::Connection,
    chat_id: i64,
    external_message_id: &str,
) -> rusqlite::Result<Option<ChatMessage>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM chat_messages WHERE chat_id = ?1 AND external_message_id = ?2"
        ),
        params![chat_id, external_message_id],
        from_row,
    )
    .optional()
}

/// Insert a message and update the chat's timing aggregates in one
/// transaction.
///
/// A message whose `external_message_id` already exists in the chat is not
/// inserted; the existing row is returned with `created = false`.
pub async fn create_message_and_update_chat(
    db: &Database,
    new: &NewMessage,
) -> Result<MessageInsert, OmnichatError> {
    let new = new.clone();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<MessageInsert, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let inserted = insert_in_tx(&tx, &new, None, &now)?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert operator rows unless any of them repeats a recent one.
///
/// Each draft is matched against rows of the same chat, sender and type
/// whose `dedup_key` is equal and whose `created_at` is at or after `since`.
/// The lookup and the inserts share one IMMEDIATE transaction, so of two
/// identical concurrent sends exactly one is stored.
pub async fn create_unless_duplicate(
    db: &Database,
    drafts: &[OperatorDraft],
    since: &str,
) -> Result<OperatorInsert, OmnichatError> {
    let drafts = drafts.to_vec();
    let since = since.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<OperatorInsert, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            for (index, draft) in drafts.iter().enumerate() {
                let previous = tx
                    .query_row(
                        &format!(
                            "SELECT {COLUMNS} FROM chat_messages
                             WHERE chat_id = ?1 AND sender_type = ?2 AND message_type = ?3
                               AND dedup_key = ?4 AND created_at >= ?5
                             ORDER BY id DESC LIMIT 1"
                        ),
                        params![
                            draft.message.chat_id,
                            draft.message.sender_type.to_string(),
                            draft.message.message_type.to_string(),
                            draft.dedup_key,
                            since,
                        ],
                        from_row,
                    )
                    .optional()?;
                if let Some(previous) = previous {
                    return Ok(OperatorInsert::Duplicate { index, previous });
                }
            }

            let mut created = Vec::with_capacity(drafts.len());
            for draft in &drafts {
                let inserted = insert_in_tx(&tx, &draft.message, Some(&draft.dedup_key), &now)?;
                created.push(inserted.message);
            }
            tx.commit()?;
            Ok(OperatorInsert::Created(created))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn insert_in_tx(
    tx: &rusqlite::Transaction<'_>,
    new: &NewMessage,
    dedup_key: Option<&str>,
    now: &str,
) -> rusqlite::Result<MessageInsert> {
    if let Some(ext) = new.external_message_id.as_deref()
        && let Some(existing) = select_by_external(tx, new.chat_id, ext)?
    {
        return Ok(MessageInsert {
            message: existing,
            created: false,
        });
    }

    let created_at = new.created_at.clone().unwrap_or_else(|| now.to_string());
    tx.execute(
        "INSERT INTO chat_messages
            (chat_id, sender_type, content, message_type, external_message_id,
             status, source, created_at, updated_at, dedup_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            new.chat_id,
            new.sender_type.to_string(),
            new.content,
            new.message_type.to_string(),
            new.external_message_id,
            new.status.to_string(),
            new.source.to_string(),
            created_at,
            now,
            dedup_key,
        ],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE chats SET
            last_message_time = CASE
                WHEN last_message_time IS NULL OR last_message_time < ?2 THEN ?2
                ELSE last_message_time END,
            first_message_time = CASE
                WHEN ?3 = 'CLIENT' AND (first_message_time IS NULL OR first_message_time > ?2) THEN ?2
                ELSE first_message_time END,
            updated_at = ?4
         WHERE id = ?1",
        params![new.chat_id, created_at, new.sender_type.to_string(), now],
    )?;

    if new.sender_type == SenderType::Operator
        && let Some(seconds) = response_seconds(tx, new.chat_id, id, &created_at)?
    {
        tx.execute(
            "UPDATE chats SET
                first_response_time_seconds = COALESCE(first_response_time_seconds, ?2),
                last_response_time_seconds = ?2
             WHERE id = ?1",
            params![new.chat_id, seconds],
        )?;
    }

    let message = select_by_id(tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    Ok(MessageInsert {
        message,
        created: true,
    })
}

/// Seconds from the first CLIENT message after the previous OPERATOR reply
/// up to this operator message. `None` when nothing was awaiting a reply.
fn response_seconds(
    conn: &rusqlite::Connection,
    chat_id: i64,
    operator_message_id: i64,
    operator_at: &str,
) -> rusqlite::Result<Option<i64>> {
    let previous_reply: Option<String> = conn
        .query_row(
            "SELECT created_at FROM chat_messages
             WHERE chat_id = ?1 AND sender_type = 'OPERATOR' AND id != ?2 AND created_at <= ?3
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![chat_id, operator_message_id, operator_at],
            |r| r.get(0),
        )
        .optional()?;
    let awaiting: Option<String> = conn
        .query_row(
            "SELECT created_at FROM chat_messages
             WHERE chat_id = ?1 AND sender_type = 'CLIENT'
               AND created_at > COALESCE(?2, '') AND created_at <= ?3
             ORDER BY created_at ASC, id ASC LIMIT 1",
            params![chat_id, previous_reply, operator_at],
            |r| r.get(0),
        )
        .optional()?;
    Ok(awaiting
        .and_then(|client_at| omnichat_core::time::seconds_between(&client_at, operator_at))
        .map(|s| s.max(0)))
}

pub async fn get_message(db: &Database, id: i64) -> Result<Option<ChatMessage>, OmnichatError> {
    db.connection()
        .call(move |conn| select_by_id(conn, id))
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_message_by_external(
    db: &Database,
    chat_id: i64,
    external_message_id: &str,
) -> Result<Option<ChatMessage>, OmnichatError> {
    let ext = external_message_id.to_string();
    db.connection()
        .call(move |conn| select_by_external(conn, chat_id, &ext))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a partial update. Errors with `NotFound` when the row is missing.
pub async fn update_message(
    db: &Database,
    id: i64,
    update: &MessageUpdate,
) -> Result<ChatMessage, OmnichatError> {
    let status = update.status.map(|s| s.to_string());
    let ext = update.external_message_id.clone();
    let content = update.content.clone();
    let now = omnichat_core::time::now();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<ChatMessage>, rusqlite::Error> {
            conn.execute(
                "UPDATE chat_messages SET
                    status = COALESCE(?2, status),
                    external_message_id = COALESCE(?3, external_message_id),
                    content = COALESCE(?4, content),
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, status, ext, content, now],
            )?;
            select_by_id(conn, id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    row.ok_or_else(|| OmnichatError::NotFound {
        entity: "message",
        id: id.to_string(),
    })
}

/// Set the status of a message addressed by its external id.
pub async fn update_status_by_external(
    db: &Database,
    chat_id: i64,
    external_message_id: &str,
    status: MessageStatus,
) -> Result<Option<ChatMessage>, OmnichatError> {
    let ext = external_message_id.to_string();
    let status = status.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<Option<ChatMessage>, rusqlite::Error> {
            conn.execute(
                "UPDATE chat_messages SET status = ?3, updated_at = ?4
                 WHERE chat_id = ?1 AND external_message_id = ?2",
                params![chat_id, ext, status, now],
            )?;
            select_by_external(conn, chat_id, &ext)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Oldest-first page of a chat's messages.
pub async fn list_messages(
    db: &Database,
    chat_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<ChatMessage>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ChatMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM chat_messages WHERE chat_id = ?1
                 ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(params![chat_id, limit, offset], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark every unread CLIENT message of a chat as READ. Returns the ids changed.
pub async fn mark_chat_read(db: &Database, chat_id: i64) -> Result<Vec<i64>, OmnichatError> {
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM chat_messages
                     WHERE chat_id = ?1 AND sender_type = 'CLIENT' AND status NOT IN ('READ', 'DELETED')",
                )?;
                let rows = stmt.query_map(params![chat_id], |r| r.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            tx.execute(
                "UPDATE chat_messages SET status = 'READ', updated_at = ?2
                 WHERE chat_id = ?1 AND sender_type = 'CLIENT' AND status NOT IN ('READ', 'DELETED')",
                params![chat_id, now],
            )?;
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
