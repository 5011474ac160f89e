// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat, message and credential persistence on one SQLite file.
//!
//! A single `tokio-rusqlite` connection serialises every write; WAL lets
//! readers overlap with it. Schema changes ship as refinery migrations run
//! on open. Callers go through `queries::*` and never see raw SQL. The
//! credential tables only ever hold ciphertext, sealed by the vault.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
