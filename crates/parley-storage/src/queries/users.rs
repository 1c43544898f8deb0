// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User account rows and the balance ledger statements.
//!
//! Every ledger operation is a single `UPDATE ... RETURNING`, so concurrent
//! callers never read-modify-write the balance.

use chrono::{DateTime, Utc};
use parley_core::ParleyError;
use parley_core::types::{
    DialogId, FxQuote, PersonaId, UserAccount, UserId, UserProfile, UserRecord, UserUpdate,
};
use rusqlite::{OptionalExtension, params};

use super::conversion_error;
use crate::database::Database;

const USER_COLUMNS: &str = "id, first_name, last_name, username, balance, total_used, persona, \
     active_dialog_id, last_activity_at, is_privileged, is_paying, fx_rate, fx_as_of, created_at";

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccount> {
    let persona: String = row.get(6)?;
    let persona = persona
        .parse::<PersonaId>()
        .map_err(|e| conversion_error(6, e))?;
    let active_dialog: Option<String> = row.get(7)?;
    let fx_as_of: DateTime<Utc> = row.get(12)?;

    Ok(UserRecord {
        id: UserId(row.get(0)?),
        profile: UserProfile {
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            username: row.get(3)?,
        },
        balance: row.get(4)?,
        total_used: row.get(5)?,
        persona,
        active_dialog: active_dialog.map(DialogId),
        last_activity_at: row.get(8)?,
        is_privileged: row.get(9)?,
        is_paying: row.get(10)?,
        fx: FxQuote {
            rate: row.get(11)?,
            as_of: fx_as_of,
        },
        created_at: row.get(13)?,
    }
    .into())
}

fn not_found(id: UserId) -> ParleyError {
    ParleyError::UserNotFound { user: id.0 }
}

/// Load one account.
pub async fn get_user(db: &Database, id: UserId) -> Result<Option<UserAccount>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let account = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![id.0],
                    row_to_account,
                )
                .optional()?;
            Ok(account)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new account. Returns `false` when the id is already registered.
pub async fn insert_user(db: &Database, account: &UserAccount) -> Result<bool, ParleyError> {
    let r = account.as_record().clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    r.id.0,
                    r.profile.first_name,
                    r.profile.last_name,
                    r.profile.username,
                    r.balance,
                    r.total_used,
                    r.persona.as_ref(),
                    r.active_dialog.map(|d| d.0),
                    r.last_activity_at,
                    r.is_privileged,
                    r.is_paying,
                    r.fx.rate,
                    r.fx.as_of,
                    r.created_at,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a single-field update.
pub async fn update_user(db: &Database, id: UserId, update: UserUpdate) -> Result<(), ParleyError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let changed = match update {
                UserUpdate::Profile(p) => conn.execute(
                    "UPDATE users SET first_name = ?1, last_name = ?2, username = ?3 WHERE id = ?4",
                    params![p.first_name, p.last_name, p.username, id.0],
                )?,
                UserUpdate::Persona(persona) => conn.execute(
                    "UPDATE users SET persona = ?1 WHERE id = ?2",
                    params![persona.as_ref(), id.0],
                )?,
                UserUpdate::ActiveDialog(dialog) => conn.execute(
                    "UPDATE users SET active_dialog_id = ?1 WHERE id = ?2",
                    params![dialog.0, id.0],
                )?,
                UserUpdate::LastActivity(at) => conn.execute(
                    "UPDATE users SET last_activity_at = ?1 WHERE id = ?2",
                    params![at, id.0],
                )?,
                UserUpdate::Fx(quote) => conn.execute(
                    "UPDATE users SET fx_rate = ?1, fx_as_of = ?2 WHERE id = ?3",
                    params![quote.rate, quote.as_of, id.0],
                )?,
                UserUpdate::Paying(flag) => conn.execute(
                    "UPDATE users SET is_paying = ?1 WHERE id = ?2",
                    params![flag, id.0],
                )?,
                UserUpdate::Privileged(flag) => conn.execute(
                    "UPDATE users SET is_privileged = ?1 WHERE id = ?2",
                    params![flag, id.0],
                )?,
            };
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match changed {
        0 => Err(not_found(id)),
        _ => Ok(()),
    }
}

/// Hard-delete an account. Dialogs and usage rows cascade.
pub async fn delete_user(db: &Database, id: UserId) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id.0])?;
            Ok(deleted == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All accounts, ordered by id.
pub async fn list_users(db: &Database) -> Result<Vec<UserAccount>, ParleyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
            let rows = stmt.query_map([], row_to_account)?;
            let mut accounts = Vec::new();
            for row in rows {
                accounts.push(row?);
            }
            Ok(accounts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Runs a `... RETURNING balance` statement against one user.
async fn returning_balance(
    db: &Database,
    id: UserId,
    sql: &'static str,
    amount: i64,
) -> Result<i64, ParleyError> {
    let balance = db
        .connection()
        .call(move |conn| {
            let balance = conn
                .query_row(sql, params![amount, id.0], |row| row.get::<_, i64>(0))
                .optional()?;
            Ok(balance)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    balance.ok_or_else(|| not_found(id))
}

/// `balance += amount`, floored at zero.
pub async fn credit_balance(db: &Database, id: UserId, amount: i64) -> Result<i64, ParleyError> {
    returning_balance(
        db,
        id,
        "UPDATE users SET balance = MAX(0, balance + ?1) WHERE id = ?2 RETURNING balance",
        amount,
    )
    .await
}

/// `balance = max(0, balance - amount)` and `total_used += amount`.
pub async fn debit_balance(db: &Database, id: UserId, amount: i64) -> Result<i64, ParleyError> {
    returning_balance(
        db,
        id,
        "UPDATE users SET balance = MAX(0, balance - ?1), total_used = total_used + ?1
         WHERE id = ?2 RETURNING balance",
        amount.max(0),
    )
    .await
}

/// Overwrite the balance, floored at zero.
pub async fn set_balance(db: &Database, id: UserId, balance: i64) -> Result<(), ParleyError> {
    returning_balance(
        db,
        id,
        "UPDATE users SET balance = MAX(0, ?1) WHERE id = ?2 RETURNING balance",
        balance,
    )
    .await
    .map(|_| ())
}

/// `total_used += amount`; the balance is untouched.
pub async fn add_total_used(db: &Database, id: UserId, amount: i64) -> Result<(), ParleyError> {
    returning_balance(
        db,
        id,
        "UPDATE users SET total_used = total_used + ?1 WHERE id = ?2 RETURNING balance",
        amount.max(0),
    )
    .await
    .map(|_| ())
}

/// Raise every balance below `floor` up to `floor`. Returns the raised users.
pub async fn raise_balances_to(db: &Database, floor: i64) -> Result<Vec<UserId>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("UPDATE users SET balance = ?1 WHERE balance < ?1 RETURNING id")?;
            let rows = stmt.query_map(params![floor], |row| row.get::<_, i64>(0))?;
            let mut raised = Vec::new();
            for row in rows {
                raised.push(UserId(row?));
            }
            raised.sort();
            Ok(raised)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
