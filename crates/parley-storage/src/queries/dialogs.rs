// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialog rows. Turns are stored as a JSON array and replaced wholesale.

use parley_core::ParleyError;
use parley_core::types::{Dialog, DialogId, PersonaId, Turn, UserId};
use rusqlite::{OptionalExtension, params};

use super::conversion_error;
use crate::database::Database;

fn encode_turns(turns: &[Turn]) -> Result<String, ParleyError> {
    serde_json::to_string(turns).map_err(|e| ParleyError::Storage {
        source: Box::new(e),
    })
}

/// Insert a new dialog.
pub async fn insert_dialog(db: &Database, dialog: &Dialog) -> Result<(), ParleyError> {
    let turns = encode_turns(&dialog.turns)?;
    let dialog = dialog.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dialogs (id, user_id, persona, created_at, turns)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    dialog.id.0,
                    dialog.user_id.0,
                    dialog.persona.as_ref(),
                    dialog.created_at,
                    turns,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load a dialog with its turns.
pub async fn get_dialog(db: &Database, id: &DialogId) -> Result<Option<Dialog>, ParleyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let dialog = conn
                .query_row(
                    "SELECT id, user_id, persona, created_at, turns FROM dialogs WHERE id = ?1",
                    params![id],
                    |row| {
                        let persona: String = row.get(2)?;
                        let turns: String = row.get(4)?;
                        Ok(Dialog {
                            id: DialogId(row.get(0)?),
                            user_id: UserId(row.get(1)?),
                            persona: persona
                                .parse::<PersonaId>()
                                .map_err(|e| conversion_error(2, e))?,
                            created_at: row.get(3)?,
                            turns: serde_json::from_str(&turns)
                                .map_err(|e| conversion_error(4, e))?,
                        })
                    },
                )
                .optional()?;
            Ok(dialog)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Overwrite the turn list of a dialog. A missing dialog is left missing.
pub async fn replace_turns(db: &Database, id: &DialogId, turns: &[Turn]) -> Result<(), ParleyError> {
    let turns = encode_turns(turns)?;
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dialogs SET turns = ?1 WHERE id = ?2",
                params![turns, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::{delete_user, insert_user};
    use chrono::Utc;
    use parley_core::types::{FxQuote, UserAccount, UserProfile};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        let now = Utc::now();
        let account = UserAccount::register(
            UserId(1),
            UserProfile::default(),
            100,
            PersonaId::Assistant,
            FxQuote { rate: 75.0, as_of: now },
            now,
        );
        insert_user(&db, &account).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn new_dialog_starts_empty() {
        let (db, _dir) = setup_db().await;
        let dialog = Dialog::start(UserId(1), PersonaId::EnglishTutor);
        insert_dialog(&db, &dialog).await.unwrap();

        let loaded = get_dialog(&db, &dialog.id).await.unwrap().unwrap();
        assert_eq!(loaded, dialog);
        assert!(loaded.turns.is_empty());
    }

    #[tokio::test]
    async fn replace_turns_overwrites_history() {
        let (db, _dir) = setup_db().await;
        let dialog = Dialog::start(UserId(1), PersonaId::Assistant);
        insert_dialog(&db, &dialog).await.unwrap();

        let first = vec![Turn::new("hi", "hello"), Turn::new("how are you", "fine")];
        replace_turns(&db, &dialog.id, &first).await.unwrap();
        let second = vec![Turn::new("how are you", "fine")];
        replace_turns(&db, &dialog.id, &second).await.unwrap();

        let loaded = get_dialog(&db, &dialog.id).await.unwrap().unwrap();
        assert_eq!(loaded.turns, second);
    }

    #[tokio::test]
    async fn missing_dialog_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_dialog(&db, &DialogId("nope".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dialogs_cascade_with_their_user() {
        let (db, _dir) = setup_db().await;
        let dialog = Dialog::start(UserId(1), PersonaId::Assistant);
        insert_dialog(&db, &dialog).await.unwrap();

        delete_user(&db, UserId(1)).await.unwrap();
        assert!(get_dialog(&db, &dialog.id).await.unwrap().is_none());
    }
}
