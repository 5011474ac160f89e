// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value rows owned by the credential vault (KDF salt, key check).

use omnichat_core::OmnichatError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

pub async fn get_meta(db: &Database, key: &str) -> Result<Option<Vec<u8>>, OmnichatError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Vec<u8>>, rusqlite::Error> {
            conn.query_row(
                "SELECT value FROM vault_meta WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store `value` under `key` unless a value already exists. Returns the
/// value now stored, so concurrent first writers agree.
pub async fn put_meta_if_absent(
    db: &Database,
    key: &str,
    value: &[u8],
) -> Result<Vec<u8>, OmnichatError> {
    let key = key.to_string();
    let value = value.to_vec();
    db.connection()
        .call(move |conn| -> Result<Vec<u8>, rusqlite::Error> {
            conn.execute(
                "INSERT INTO vault_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING",
                params![key, value],
            )?;
            conn.query_row(
                "SELECT value FROM vault_meta WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_writer_wins() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(get_meta(&db, "salt").await.unwrap().is_none());
        let a = put_meta_if_absent(&db, "salt", b"aaaa").await.unwrap();
        let b = put_meta_if_absent(&db, "salt", b"bbbb").await.unwrap();
        assert_eq!(a, b"aaaa");
        assert_eq!(b, b"aaaa");
        assert_eq!(get_meta(&db, "salt").await.unwrap().as_deref(), Some(&b"aaaa"[..]));
    }
}
