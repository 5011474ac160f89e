// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel lookups. One row per platform type.

use omnichat_core::OmnichatError;
use omnichat_core::types::{Channel, ChannelType};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::queries::enum_col;

const COLUMNS: &str = "id, type, name, active, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        channel_type: enum_col(row, 1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub async fn get_channel_by_type(
    db: &Database,
    channel_type: ChannelType,
) -> Result<Option<Channel>, OmnichatError> {
    let kind = channel_type.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Channel>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channels WHERE type = ?1"),
                params![kind],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_channel(db: &Database, id: i64) -> Result<Option<Channel>, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<Option<Channel>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channels WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return the channel for `channel_type`, creating it on first use.
pub async fn ensure_channel(
    db: &Database,
    channel_type: ChannelType,
    name: &str,
) -> Result<Channel, OmnichatError> {
    let kind = channel_type.to_string();
    let name = name.to_string();
    let now = omnichat_core::time::now();
    db.connection()
        .call(move |conn| -> Result<Channel, rusqlite::Error> {
            conn.execute(
                "INSERT INTO channels (type, name, active, created_at) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(type) DO NOTHING",
                params![kind, name, now],
            )?;
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channels WHERE type = ?1"),
                params![kind],
                from_row,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_channels(db: &Database) -> Result<Vec<Channel>, OmnichatError> {
    db.connection()
        .call(|conn| -> Result<Vec<Channel>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM channels ORDER BY id"))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_channel_active(db: &Database, id: i64, active: bool) -> Result<bool, OmnichatError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute(
                "UPDATE channels SET active = ?2 WHERE id = ?1",
                params![id, active],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
