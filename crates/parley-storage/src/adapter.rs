// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::types::{
    Dialog, DialogId, Turn, UsageKind, UsageRecord, UserAccount, UserId, UserUpdate,
};
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// call fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Users ---

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, ParleyError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn insert_user(&self, account: &UserAccount) -> Result<bool, ParleyError> {
        queries::users::insert_user(self.db()?, account).await
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<(), ParleyError> {
        queries::users::update_user(self.db()?, id, update).await
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, ParleyError> {
        queries::users::delete_user(self.db()?, id).await
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, ParleyError> {
        queries::users::list_users(self.db()?).await
    }

    // --- Ledger primitives ---

    async fn credit_balance(&self, id: UserId, amount: i64) -> Result<i64, ParleyError> {
        queries::users::credit_balance(self.db()?, id, amount).await
    }

    async fn debit_balance(&self, id: UserId, amount: i64) -> Result<i64, ParleyError> {
        queries::users::debit_balance(self.db()?, id, amount).await
    }

    async fn add_total_used(&self, id: UserId, amount: i64) -> Result<(), ParleyError> {
        queries::users::add_total_used(self.db()?, id, amount).await
    }

    async fn set_balance(&self, id: UserId, balance: i64) -> Result<(), ParleyError> {
        queries::users::set_balance(self.db()?, id, balance).await
    }

    async fn raise_balances_to(&self, floor: i64) -> Result<Vec<UserId>, ParleyError> {
        queries::users::raise_balances_to(self.db()?, floor).await
    }

    // --- Usage log ---

    async fn log_usage(&self, record: &UsageRecord) -> Result<(), ParleyError> {
        queries::usage::log_usage(self.db()?, record).await
    }

    async fn usage_summary(&self, id: UserId) -> Result<Vec<(UsageKind, i64)>, ParleyError> {
        queries::usage::usage_summary(self.db()?, id).await
    }

    // --- Dialogs ---

    async fn insert_dialog(&self, dialog: &Dialog) -> Result<(), ParleyError> {
        queries::dialogs::insert_dialog(self.db()?, dialog).await
    }

    async fn get_dialog(&self, id: &DialogId) -> Result<Option<Dialog>, ParleyError> {
        queries::dialogs::get_dialog(self.db()?, id).await
    }

    async fn replace_turns(&self, id: &DialogId, turns: &[Turn]) -> Result<(), ParleyError> {
        queries::dialogs::replace_turns(self.db()?, id, turns).await
    }
}
