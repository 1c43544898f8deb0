// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only usage log.

use parley_core::ParleyError;
use parley_core::types::{UsageKind, UsageRecord, UserId};
use rusqlite::params;

use super::conversion_error;
use crate::database::Database;

/// Append one usage record.
pub async fn log_usage(db: &Database, record: &UsageRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO usage_log (id, user_id, kind, tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.user_id.0,
                    record.kind.to_string(),
                    record.tokens,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Total tokens per kind for one user, ordered by kind name.
pub async fn usage_summary(db: &Database, id: UserId) -> Result<Vec<(UsageKind, i64)>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, SUM(tokens) FROM usage_log
                 WHERE user_id = ?1 GROUP BY kind ORDER BY kind",
            )?;
            let rows = stmt.query_map(params![id.0], |row| {
                let kind: String = row.get(0)?;
                let kind = kind
                    .parse::<UsageKind>()
                    .map_err(|e| conversion_error(0, e))?;
                Ok((kind, row.get::<_, i64>(1)?))
            })?;
            let mut summary = Vec::new();
            for row in rows {
                summary.push(row?);
            }
            Ok(summary)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
