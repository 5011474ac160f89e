// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the chat core tables.

pub mod channels;
pub mod chats;
pub mod contacts;
pub mod credentials;
pub mod messages;
pub mod pictures;
pub mod vault_meta;

use std::str::FromStr;

use rusqlite::types::Type;

/// Read a TEXT column into a strum enum.
pub(crate) fn enum_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding a JSON document.
pub(crate) fn json_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use omnichat_core::types::{ChannelType, NewChat};

    use crate::Database;
    use crate::models::Chat;

    /// In-memory database with one AVITO channel.
    pub async fn db_with_channel() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let channel = super::channels::ensure_channel(&db, ChannelType::Avito, "Avito")
            .await
            .unwrap();
        (db, channel.id)
    }

    pub async fn chat(db: &Database, channel_id: i64, tenant: i64, external: &str) -> Chat {
        super::chats::get_or_create_chat(
            db,
            &NewChat {
                channel_id,
                tenant_id: tenant,
                external_chat_id: external.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .chat
    }
}
