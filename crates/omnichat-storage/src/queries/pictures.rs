// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment links. Insert-only.

use omnichat_core::OmnichatError;
use omnichat_core::types::{Picture, TenantId};
use rusqlite::params;

use crate::database::Database;

const COLUMNS: &str = "p.id, p.message_id, p.url, p.size, p.is_main, p.owner_tenant_id, p.created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Picture> {
    Ok(Picture {
        id: row.get(0)?,
        message_id: row.get(1)?,
        url: row.get(2)?,
        size: row.get(3)?,
        is_main: row.get(4)?,
        owner_tenant_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub async fn insert_picture(
    db: &Database,
    message_id: i64,
    url: &str,
    size: Option<i64>,
    is_main: bool,
    owner_tenant_id: TenantId,
) -> Result<Picture, OmnichatError> {
    let url = url.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<Picture, rusqlite::Error> {
            conn.execute(
                "INSERT INTO pictures (message_id, url, size, is_main, owner_tenant_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![message_id, url, size, is_main, owner_tenant_id, now],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM pictures p WHERE p.id = ?1"),
                params![id],
                from_row,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_for_message(db: &Database, message_id: i64) -> Result<Vec<Picture>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Picture>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM pictures p WHERE p.message_id = ?1 ORDER BY p.is_main DESC, p.id"
            ))?;
            let rows = stmt.query_map(params![message_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_for_chat(db: &Database, chat_id: i64) -> Result<Vec<Picture>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Picture>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM pictures p
                 JOIN chat_messages m ON m.id = p.message_id
                 WHERE m.chat_id = ?1 ORDER BY m.created_at, p.id"
            ))?;
            let rows = stmt.query_map(params![chat_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::messages::create_message_and_update_chat;
    use crate::queries::testing::{chat, db_with_channel};
    use omnichat_core::types::{MessageSource, MessageStatus, MessageType, NewMessage, SenderType};

    #[tokio::test]
    async fn pictures_listed_by_message_and_chat() {
        let (db, ch) = db_with_channel().await;
        let c = chat(&db, ch, 7, "c1").await;
        let m = create_message_and_update_chat(
            &db,
            &NewMessage {
                chat_id: c.id,
                sender_type: SenderType::Client,
                content: "[Image: x]".into(),
                message_type: MessageType::Image,
                external_message_id: Some("m1".into()),
                status: MessageStatus::Delivered,
                source: MessageSource::Webhook,
                created_at: None,
            },
        )
        .await
        .unwrap()
        .message;
        insert_picture(&db, m.id, "https://img/1.jpg", None, true, 7).await.unwrap();
        insert_picture(&db, m.id, "media/2.png", Some(10), false, 7).await.unwrap();

        let by_msg = list_for_message(&db, m.id).await.unwrap();
        assert_eq!(by_msg.len(), 2);
        assert!(by_msg[0].is_main);
        assert_eq!(list_for_chat(&db, c.id).await.unwrap().len(), 2);
    }
}
