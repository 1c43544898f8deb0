// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Parley bot.
//!
//! WAL-mode SQLite with embedded migrations, serialized through a single
//! `tokio-rusqlite` connection. Holds user accounts and their balance
//! ledger, dialogs with their turn history, and a usage audit log.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
