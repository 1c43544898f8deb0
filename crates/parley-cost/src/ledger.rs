// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user token balance.
//!
//! Every write goes through one storage ledger primitive, so balances stay
//! consistent under concurrent turns from different users. The balance is
//! never negative: excess usage is absorbed, while `total_used` always grows
//! by the full amount.

use std::sync::Arc;

use parley_core::types::{UsageKind, UsageRecord, UserAccount, UserId};
use parley_core::{ParleyError, StorageAdapter};
use tracing::{debug, info};

/// The balance ledger over a storage backend.
#[derive(Clone)]
pub struct BalanceLedger {
    storage: Arc<dyn StorageAdapter>,
}

impl BalanceLedger {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Current balance. Fails with `UserNotFound` for unknown users.
    pub async fn get_balance(&self, user: UserId) -> Result<i64, ParleyError> {
        self.storage
            .get_user(user)
            .await?
            .map(|account| account.balance())
            .ok_or(ParleyError::UserNotFound { user: user.0 })
    }

    /// Adds `amount` (top-up, admin grant). Returns the new balance.
    pub async fn credit(&self, user: UserId, amount: i64) -> Result<i64, ParleyError> {
        if amount < 0 {
            return Err(ParleyError::Internal(format!(
                "credit amount must be non-negative, got {amount}"
            )));
        }
        let balance = self.storage.credit_balance(user, amount).await?;
        info!(user_id = user.0, amount, balance, "balance credited");
        Ok(balance)
    }

    /// Subtracts `amount`, floored at zero, and adds it to `total_used`.
    pub async fn debit(&self, user: UserId, amount: i64) -> Result<i64, ParleyError> {
        let balance = self.storage.debit_balance(user, amount.max(0)).await?;
        info!(user_id = user.0, amount, balance, "balance debited");
        Ok(balance)
    }

    /// Overwrites the balance (admin reset).
    pub async fn reset(&self, user: UserId, balance: i64) -> Result<(), ParleyError> {
        self.storage.set_balance(user, balance).await?;
        info!(user_id = user.0, balance, "balance reset");
        Ok(())
    }

    /// Admission check: balance > 0, or privileged.
    ///
    /// A rejected account has its stored balance pinned to exactly zero.
    pub async fn has_sufficient(&self, account: &mut UserAccount) -> Result<bool, ParleyError> {
        if account.has_sufficient_balance() {
            return Ok(true);
        }
        self.storage.set_balance(account.id(), 0).await?;
        account.observe_balance(0);
        debug!(user_id = account.id().0, "admission refused: balance exhausted");
        Ok(false)
    }

    /// Charges a completed operation and records it in the usage log.
    ///
    /// Privileged accounts only accumulate usage; their balance is untouched.
    pub async fn settle(
        &self,
        account: &mut UserAccount,
        tokens: u64,
        kind: UsageKind,
    ) -> Result<(), ParleyError> {
        let amount = i64::try_from(tokens).unwrap_or(i64::MAX);
        let user = account.id();

        match account.is_privileged() {
            true => self.storage.add_total_used(user, amount).await?,
            false => {
                let balance = self.storage.debit_balance(user, amount).await?;
                account.observe_balance(balance);
            }
        }
        self.storage
            .log_usage(&UsageRecord::new(user, kind, amount))
            .await?;

        info!(
            user_id = user.0,
            tokens = amount,
            kind = %kind,
            balance = account.balance(),
            "usage settled"
        );
        Ok(())
    }

    /// Raises every balance below `floor` to `floor`. Returns who was refilled.
    pub async fn refill_all(&self, floor: i64) -> Result<Vec<UserId>, ParleyError> {
        let refilled = self.storage.raise_balances_to(floor).await?;
        info!(floor, count = refilled.len(), "balances refilled");
        Ok(refilled)
    }
}
