// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialog store adapter: the active dialog's turn list for a user.
//!
//! There is no append primitive. Callers read the turns, modify the list in
//! memory and write the whole list back, so every writer must hold the
//! user's gate permit.

use std::sync::Arc;

use parley_core::types::{Dialog, DialogId, Turn, UserAccount, UserUpdate};
use parley_core::{ParleyError, StorageAdapter};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct DialogStore {
    storage: Arc<dyn StorageAdapter>,
}

impl DialogStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Turns of the user's active dialog, oldest first.
    ///
    /// An account without an active dialog, or whose dialog row is missing,
    /// has an empty history.
    pub async fn get_turns(&self, account: &UserAccount) -> Result<Vec<Turn>, ParleyError> {
        let Some(id) = account.active_dialog() else {
            return Ok(Vec::new());
        };
        match self.storage.get_dialog(id).await? {
            Some(dialog) => Ok(dialog.turns),
            None => {
                warn!(user_id = account.id().0, dialog_id = %id, "active dialog not found");
                Ok(Vec::new())
            }
        }
    }

    /// Overwrites the active dialog's turn list, starting a dialog first if
    /// the account has none.
    pub async fn replace_turns(
        &self,
        account: &mut UserAccount,
        turns: &[Turn],
    ) -> Result<(), ParleyError> {
        let id = match account.active_dialog() {
            Some(id) if self.storage.get_dialog(id).await?.is_some() => id.clone(),
            _ => self.start_new_dialog(account).await?,
        };
        self.storage.replace_turns(&id, turns).await
    }

    /// Creates an empty dialog with the account's current persona and makes
    /// it the active one.
    pub async fn start_new_dialog(
        &self,
        account: &mut UserAccount,
    ) -> Result<DialogId, ParleyError> {
        let dialog = Dialog::start(account.id(), account.persona());
        self.storage.insert_dialog(&dialog).await?;

        let update = UserUpdate::ActiveDialog(dialog.id.clone());
        self.storage.update_user(account.id(), update.clone()).await?;
        account.apply(&update);

        debug!(
            user_id = account.id().0,
            dialog_id = %dialog.id,
            persona = %dialog.persona,
            "dialog started"
        );
        Ok(dialog.id)
    }
}
