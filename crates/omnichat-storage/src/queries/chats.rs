// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat rows: resolution by external id, hint updates and tenant listing.

use omnichat_core::OmnichatError;
use omnichat_core::types::{Chat, ChatStatus, NewChat, TenantId};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::Database;
use crate::models::{ChatFilter, ChatSummary, ChatUpsert};
use crate::queries::{enum_col, json_col};

pub(crate) const COLUMNS: &str = "c.id, c.channel_id, c.tenant_id, c.external_chat_id, c.contact_id, \
     c.name, c.phone, c.avatar, c.metadata, c.first_message_time, c.last_message_time, \
     c.first_response_time_seconds, c.last_response_time_seconds, c.status, c.created_at, c.updated_at";

pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        tenant_id: row.get(2)?,
        external_chat_id: row.get(3)?,
        contact_id: row.get(4)?,
        name: row.get(5)?,
        phone: row.get(6)?,
        avatar: row.get(7)?,
        metadata: json_col(row, 8)?,
        first_message_time: row.get(9)?,
        last_message_time: row.get(10)?,
        first_response_time_seconds: row.get(11)?,
        last_response_time_seconds: row.get(12)?,
        status: enum_col(row, 13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub(crate) fn select_by_id(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Chat>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM chats c WHERE c.id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

pub async fn get_chat(db: &Database, id: i64) -> Result<Option<Chat>, OmnichatError> {
    db.connection()
        .call(move |conn| select_by_id(conn, id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a chat and check it belongs to `tenant_id`.
pub async fn get_chat_for_tenant(
    db: &Database,
    id: i64,
    tenant_id: TenantId,
) -> Result<Chat, OmnichatError> {
    let chat = get_chat(db, id).await?.ok_or_else(|| OmnichatError::NotFound {
        entity: "chat",
        id: id.to_string(),
    })?;
    if chat.tenant_id != tenant_id {
        return Err(OmnichatError::AccessDenied {
            reason: format!("chat {id} belongs to another tenant"),
        });
    }
    Ok(chat)
}

pub async fn get_chat_by_external(
    db: &Database,
    channel_id: i64,
    tenant_id: TenantId,
    external_chat_id: &str,
) -> Result<Option<Chat>, OmnichatError> {
    let ext = external_chat_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Chat>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM chats c
                     WHERE c.channel_id = ?1 AND c.tenant_id = ?2 AND c.external_chat_id = ?3"
                ),
                params![channel_id, tenant_id, ext],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve `(channel_id, tenant_id, external_chat_id)` to a chat, creating
/// it if missing.
///
/// On an existing row, `name`, `phone` and `avatar` are written only where
/// the row is empty, and metadata keys from `new` are merged in.
pub async fn get_or_create_chat(db: &Database, new: &NewChat) -> Result<ChatUpsert, OmnichatError> {
    let new = new.clone();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<ChatUpsert, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM chats c
                         WHERE c.channel_id = ?1 AND c.tenant_id = ?2 AND c.external_chat_id = ?3"
                    ),
                    params![new.channel_id, new.tenant_id, new.external_chat_id],
                    from_row,
                )
                .optional()?;

            let result = match existing {
                None => {
                    let metadata = serde_json::Value::Object(new.metadata.clone()).to_string();
                    tx.execute(
                        "INSERT INTO chats
                            (channel_id, tenant_id, external_chat_id, name, phone, avatar, metadata,
                             status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'ACTIVE', ?8, ?8)",
                        params![
                            new.channel_id,
                            new.tenant_id,
                            new.external_chat_id,
                            new.name,
                            new.phone,
                            new.avatar,
                            metadata,
                            now,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    let chat = select_by_id(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                    ChatUpsert {
                        chat,
                        created: true,
                        updated: false,
                    }
                }
                Some(chat) => {
                    let mut metadata = chat.metadata.as_object().cloned().unwrap_or_default();
                    let mut meta_changed = false;
                    for (k, v) in &new.metadata {
                        if metadata.get(k) != Some(v) {
                            metadata.insert(k.clone(), v.clone());
                            meta_changed = true;
                        }
                    }
                    let fill = |current: &Option<String>, hint: &Option<String>| {
                        is_blank(current) && !is_blank(hint)
                    };
                    let changed = meta_changed
                        || fill(&chat.name, &new.name)
                        || fill(&chat.phone, &new.phone)
                        || fill(&chat.avatar, &new.avatar);
                    if changed {
                        tx.execute(
                            "UPDATE chats SET
                                name = CASE WHEN name IS NULL OR name = '' THEN COALESCE(?2, name) ELSE name END,
                                phone = CASE WHEN phone IS NULL OR phone = '' THEN COALESCE(?3, phone) ELSE phone END,
                                avatar = CASE WHEN avatar IS NULL OR avatar = '' THEN COALESCE(?4, avatar) ELSE avatar END,
                                metadata = ?5,
                                updated_at = ?6
                             WHERE id = ?1",
                            params![
                                chat.id,
                                new.name,
                                new.phone,
                                new.avatar,
                                serde_json::Value::Object(metadata).to_string(),
                                now,
                            ],
                        )?;
                    }
                    let chat = select_by_id(&tx, chat.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                    ChatUpsert {
                        chat,
                        created: false,
                        updated: changed,
                    }
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Fill empty contact fields on a chat. Returns the chat after the update.
pub async fn update_chat_hints(
    db: &Database,
    chat_id: i64,
    name: Option<String>,
    phone: Option<String>,
    avatar: Option<String>,
) -> Result<Chat, OmnichatError> {
    let now = omnichat_core::time::now();
    let chat = db
        .connection()
        .call(move |conn| -> Result<Option<Chat>, rusqlite::Error> {
            conn.execute(
                "UPDATE chats SET
                    name = CASE WHEN name IS NULL OR name = '' THEN COALESCE(?2, name) ELSE name END,
                    phone = CASE WHEN phone IS NULL OR phone = '' THEN COALESCE(?3, phone) ELSE phone END,
                    avatar = CASE WHEN avatar IS NULL OR avatar = '' THEN COALESCE(?4, avatar) ELSE avatar END,
                    updated_at = ?5
                 WHERE id = ?1",
                params![chat_id, name, phone, avatar, now],
            )?;
            select_by_id(conn, chat_id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    chat.ok_or_else(|| OmnichatError::NotFound {
        entity: "chat",
        id: chat_id.to_string(),
    })
}

/// Link a contact and copy its details into empty chat fields.
pub async fn set_chat_contact(
    db: &Database,
    chat_id: i64,
    contact_id: i64,
) -> Result<Chat, OmnichatError> {
    let now = omnichat_core::time::now();
    let chat = db
        .connection()
        .call(move |conn| -> Result<Option<Chat>, rusqlite::Error> {
            conn.execute(
                "UPDATE chats SET
                    contact_id = ?2,
                    name = CASE WHEN chats.name IS NULL OR chats.name = ''
                        THEN (SELECT name FROM chat_contacts WHERE id = ?2) ELSE chats.name END,
                    phone = CASE WHEN chats.phone IS NULL OR chats.phone = ''
                        THEN (SELECT phone FROM chat_contacts WHERE id = ?2) ELSE chats.phone END,
                    avatar = CASE WHEN chats.avatar IS NULL OR chats.avatar = ''
                        THEN (SELECT avatar FROM chat_contacts WHERE id = ?2) ELSE chats.avatar END,
                    updated_at = ?3
                 WHERE id = ?1",
                params![chat_id, contact_id, now],
            )?;
            select_by_id(conn, chat_id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    chat.ok_or_else(|| OmnichatError::NotFound {
        entity: "chat",
        id: chat_id.to_string(),
    })
}

pub async fn set_chat_status(
    db: &Database,
    chat_id: i64,
    status: ChatStatus,
) -> Result<bool, OmnichatError> {
    let status = status.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute(
                "UPDATE chats SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![chat_id, status, now],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Tenant-scoped listing with preview and unread count.
pub async fn list_chats(
    db: &Database,
    filter: &ChatFilter,
) -> Result<Vec<ChatSummary>, OmnichatError> {
    let filter = filter.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<ChatSummary>, rusqlite::Error> {
            let mut clauses = vec!["c.tenant_id = ?".to_string()];
            let mut args: Vec<SqlValue> = vec![SqlValue::Integer(filter.tenant_id)];

            if let Some(channel_id) = filter.channel_id {
                clauses.push("c.channel_id = ?".into());
                args.push(SqlValue::Integer(channel_id));
            }
            if let Some(status) = filter.status {
                clauses.push("c.status = ?".into());
                args.push(SqlValue::Text(status.to_string()));
            }
            if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                clauses.push(
                    "(c.name LIKE ? OR c.phone LIKE ? OR c.external_chat_id LIKE ?)".into(),
                );
                let pattern = format!("%{search}%");
                for _ in 0..3 {
                    args.push(SqlValue::Text(pattern.clone()));
                }
            }
            if let Some(from) = filter.created_from {
                clauses.push("c.created_at >= ?".into());
                args.push(SqlValue::Text(from));
            }
            if let Some(to) = filter.created_to {
                clauses.push("c.created_at <= ?".into());
                args.push(SqlValue::Text(to));
            }
            args.push(SqlValue::Integer(i64::from(filter.limit)));
            args.push(SqlValue::Integer(i64::from(filter.skip)));

            let order = match filter.sort_order {
                crate::models::SortOrder::Asc => "ASC",
                crate::models::SortOrder::Desc => "DESC",
            };
            let sql = format!(
                "SELECT {COLUMNS},
                    (SELECT substr(m.content, 1, 100) FROM chat_messages m
                      WHERE m.chat_id = c.id ORDER BY m.created_at DESC, m.id DESC LIMIT 1),
                    (SELECT COUNT(*) FROM chat_messages m
                      WHERE m.chat_id = c.id AND m.sender_type = 'CLIENT'
                        AND m.status NOT IN ('READ', 'DELETED'))
                 FROM chats c
                 WHERE {}
                 ORDER BY {} {order}, c.id {order}
                 LIMIT ? OFFSET ?",
                clauses.join(" AND "),
                filter.sort_by.column(),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), |row| {
                Ok(ChatSummary {
                    chat: from_row(row)?,
                    last_message_preview: row.get(16)?,
                    unread_count: row.get(17)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatSort, SortOrder};
    use crate::queries::testing::{chat, db_with_channel};

    #[tokio::test]
    async fn get_or_create_creates_once() {
        let (db, ch) = db_with_channel().await;
        let new = NewChat {
            channel_id: ch,
            tenant_id: 1,
            external_chat_id: "c1".into(),
            name: Some("Avito Chat c1".into()),
            ..Default::default()
        };
        let first = get_or_create_chat(&db, &new).await.unwrap();
        assert!(first.created);
        assert_eq!(first.chat.status, ChatStatus::Active);
        let second = get_or_create_chat(&db, &new).await.unwrap();
        assert!(!second.created);
        assert!(!second.updated);
        assert_eq!(first.chat.id, second.chat.id);
    }

    #[tokio::test]
    async fn hints_only_fill_empty_fields() {
        let (db, ch) = db_with_channel().await;
        let mut new = NewChat {
            channel_id: ch,
            tenant_id: 1,
            external_chat_id: "c1".into(),
            name: Some("Original".into()),
            ..Default::default()
        };
        get_or_create_chat(&db, &new).await.unwrap();

        new.name = Some("Renamed".into());
        new.phone = Some("+79031234567".into());
        new.metadata.insert("ad_title".into(), "Bike".into());
        let up = get_or_create_chat(&db, &new).await.unwrap();
        assert!(up.updated);
        assert_eq!(up.chat.name.as_deref(), Some("Original"));
        assert_eq!(up.chat.phone.as_deref(), Some("+79031234567"));
        assert_eq!(up.chat.metadata["ad_title"], "Bike");
    }

    #[tokio::test]
    async fn same_external_id_is_per_tenant() {
        let (db, ch) = db_with_channel().await;
        let a = chat(&db, ch, 1, "c1").await;
        let b = chat(&db, ch, 2, "c1").await;
        assert_ne!(a.id, b.id);
        assert!(matches!(
            get_chat_for_tenant(&db, a.id, 2).await,
            Err(OmnichatError::AccessDenied { .. })
        ));
        assert!(matches!(
            get_chat_for_tenant(&db, 999, 1).await,
            Err(OmnichatError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let (db, ch) = db_with_channel().await;
        for (ext, name) in [("c1", "Bob"), ("c2", "alice"), ("c3", "Carol")] {
            get_or_create_chat(
                &db,
                &NewChat {
                    channel_id: ch,
                    tenant_id: 1,
                    external_chat_id: ext.into(),
                    name: Some(name.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        chat(&db, ch, 2, "other-tenant").await;

        let mut filter = ChatFilter::for_tenant(1);
        filter.sort_by = ChatSort::Name;
        filter.sort_order = SortOrder::Asc;
        let rows = list_chats(&db, &filter).await.unwrap();
        let names: Vec<_> = rows.iter().filter_map(|r| r.chat.name.clone()).collect();
        assert_eq!(names, vec!["alice", "Bob", "Carol"]);
        assert!(rows.iter().all(|r| r.unread_count == 0 && r.last_message_preview.is_none()));

        filter.search = Some("car".into());
        assert_eq!(list_chats(&db, &filter).await.unwrap().len(), 1);

        filter.search = None;
        filter.skip = 1;
        filter.limit = 1;
        let page = list_chats(&db, &filter).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].chat.name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn close_chat_status() {
        let (db, ch) = db_with_channel().await;
        let c = chat(&db, ch, 1, "c1").await;
        assert!(set_chat_status(&db, c.id, ChatStatus::Closed).await.unwrap());
        let mut filter = ChatFilter::for_tenant(1);
        filter.status = Some(ChatStatus::Active);
        assert!(list_chats(&db, &filter).await.unwrap().is_empty());
    }
}
