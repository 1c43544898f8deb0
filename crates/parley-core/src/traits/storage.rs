// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for user accounts, dialogs, and the usage log.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Dialog, DialogId, Turn, UsageKind, UsageRecord, UserAccount, UserId, UserUpdate,
};

/// Persistence backend for the metering core.
///
/// Every method touching a single user row is atomic. The balance
/// primitives are single statements, so concurrent ledger operations from
/// different tasks never lose an update.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Users ---

    /// Loads a user account.
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, ParleyError>;

    /// Inserts a new account. Returns `false` if the id already exists.
    async fn insert_user(&self, account: &UserAccount) -> Result<bool, ParleyError>;

    /// Applies a single-field update. Fails with `UserNotFound` if absent.
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<(), ParleyError>;

    /// Hard-deletes a user and their dialogs. Returns `false` if absent.
    async fn delete_user(&self, id: UserId) -> Result<bool, ParleyError>;

    /// Lists all accounts ordered by id.
    async fn list_users(&self) -> Result<Vec<UserAccount>, ParleyError>;

    // --- Ledger primitives ---

    /// `balance += amount`; returns the new balance.
    async fn credit_balance(&self, id: UserId, amount: i64) -> Result<i64, ParleyError>;

    /// `balance = max(0, balance - amount)` and `total_used += amount`; returns the new balance.
    async fn debit_balance(&self, id: UserId, amount: i64) -> Result<i64, ParleyError>;

    /// `total_used += amount` without touching the balance.
    async fn add_total_used(&self, id: UserId, amount: i64) -> Result<(), ParleyError>;

    /// Overwrites the balance.
    async fn set_balance(&self, id: UserId, balance: i64) -> Result<(), ParleyError>;

    /// Raises every balance below `floor` to `floor`; returns the affected users.
    async fn raise_balances_to(&self, floor: i64) -> Result<Vec<UserId>, ParleyError>;

    // --- Usage log ---

    /// Appends a usage record.
    async fn log_usage(&self, record: &UsageRecord) -> Result<(), ParleyError>;

    /// Sums logged usage for a user, per kind.
    async fn usage_summary(&self, id: UserId) -> Result<Vec<(UsageKind, i64)>, ParleyError>;

    // --- Dialogs ---

    /// Persists a new dialog.
    async fn insert_dialog(&self, dialog: &Dialog) -> Result<(), ParleyError>;

    /// Loads a dialog with its turns.
    async fn get_dialog(&self, id: &DialogId) -> Result<Option<Dialog>, ParleyError>;

    /// Overwrites the whole turn list of a dialog.
    async fn replace_turns(&self, id: &DialogId, turns: &[Turn]) -> Result<(), ParleyError>;
}
