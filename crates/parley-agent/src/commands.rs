// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash commands, keyboard buttons and payment events.

use chrono::Utc;
use parley_context::persona;
use parley_core::types::{
    ButtonAction, ChatId, InboundMessage, Invoice, OutboundMessage, PaymentReceipt, PersonaId,
    UserAccount, UserId, UserUpdate,
};
use parley_core::ParleyError;
use tracing::{info, warn};

use crate::notices;
use crate::pipeline::MeteringPipeline;
use crate::router::Command;

/// Column order of the `/users` export.
const USER_CSV_HEADER: [&str; 9] = [
    "number",
    "id",
    "username",
    "first_name",
    "last_name",
    "last_activity_at",
    "total_used",
    "balance",
    "is_paying",
];

/// Renders accounts as CSV, one row per user.
pub fn users_csv(accounts: &[UserAccount]) -> Result<Vec<u8>, ParleyError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| ParleyError::Internal(format!("csv export: {e}"));

    writer.write_record(USER_CSV_HEADER).map_err(csv_err)?;
    for (idx, account) in accounts.iter().enumerate() {
        let profile = account.profile();
        writer
            .write_record([
                (idx + 1).to_string(),
                account.id().to_string(),
                profile.username.clone().unwrap_or_default(),
                profile.first_name.clone().unwrap_or_default(),
                profile.last_name.clone().unwrap_or_default(),
                account.last_activity_at().to_rfc3339(),
                account.total_used().to_string(),
                account.balance().to_string(),
                account.is_paying().to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| ParleyError::Internal(format!("csv export: {e}")))
}

impl MeteringPipeline {
    pub(crate) async fn handle_command(
        &self,
        msg: &InboundMessage,
        command: Command,
    ) -> Result<(), ParleyError> {
        let chat = msg.chat_id;
        let mut account = self.admit(&msg.sender).await?;
        info!(user_id = account.id().0, command = ?command, "command received");

        if command.is_admin() && !account.is_privileged() {
            self.notify(OutboundMessage::text(chat, notices::ADMIN_ONLY))
                .await;
            return Ok(());
        }

        match command {
            Command::Start => {
                let name = account.profile().display_name();
                self.notify(
                    OutboundMessage::html(chat, notices::welcome(&name, account.balance()))
                        .with_keyboard(notices::main_keyboard()),
                )
                .await;
                self.notify(OutboundMessage::html(
                    chat,
                    notices::help(
                        &self.config.triggers.image_prefix,
                        &self.config.triggers.speak_prefix,
                    ),
                ))
                .await;
            }
            Command::Help => {
                self.notify(OutboundMessage::html(
                    chat,
                    notices::help(
                        &self.config.triggers.image_prefix,
                        &self.config.triggers.speak_prefix,
                    ),
                ))
                .await;
            }
            Command::Profile => {
                let persona = persona(account.persona());
                self.notify(OutboundMessage::html(chat, notices::profile(&account, persona)))
                    .await;
            }
            Command::NewDialog => self.new_dialog(&mut account, chat, None).await?,
            Command::Mode => self.show_personas(chat).await,
            Command::Retry => {
                self.retry(msg).await?;
            }
            Command::Balance => self.show_balance(&mut account, chat).await?,
            Command::Buy => self.send_invoice(chat).await,
            Command::Reset(user) => {
                let initial = self.config.billing.initial_balance;
                let text = match self.ledger.reset(user, initial).await {
                    Ok(()) => format!("Balance of {user} reset to {initial}."),
                    Err(ParleyError::UserNotFound { .. }) => format!("User {user} not found."),
                    Err(e) => return Err(e),
                };
                self.notify(OutboundMessage::text(chat, text)).await;
            }
            Command::Add(user, amount) => {
                let text = match self.ledger.credit(user, amount).await {
                    Ok(balance) => {
                        format!("Added {amount} tokens to {user}, balance is now {balance}.")
                    }
                    Err(ParleyError::UserNotFound { .. }) => format!("User {user} not found."),
                    Err(e) => return Err(e),
                };
                self.notify(OutboundMessage::text(chat, text)).await;
            }
            Command::Delete(user) => {
                let text = match self.storage.delete_user(user).await? {
                    true => {
                        info!(user_id = user.0, "user deleted by admin");
                        format!("User {user} deleted.")
                    }
                    false => format!("User {user} not found."),
                };
                self.notify(OutboundMessage::text(chat, text)).await;
            }
            Command::Users => {
                let accounts = self.storage.list_users().await?;
                let data = users_csv(&accounts)?;
                let caption = format!("{} users", accounts.len());
                self.channel
                    .send_document(chat, "users.csv", data, Some(&caption))
                    .await?;
            }
            Command::Broadcast(text) => {
                let (delivered, failed) = self.broadcast(&text).await?;
                self.notify(OutboundMessage::text(
                    chat,
                    notices::broadcast_summary(delivered, failed),
                ))
                .await;
            }
            Command::Refill => {
                let count = self.refill_now().await?;
                self.notify(OutboundMessage::text(chat, notices::refill_summary(count)))
                    .await;
            }
            Command::Invalid(usage) => {
                let text = match usage.is_empty() {
                    true => notices::UNKNOWN_COMMAND.to_string(),
                    false => usage,
                };
                self.notify(OutboundMessage::text(chat, text)).await;
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_button(
        &self,
        msg: &InboundMessage,
        action: ButtonAction,
    ) -> Result<(), ParleyError> {
        let chat = msg.chat_id;
        let mut account = self.admit(&msg.sender).await?;
        match action {
            ButtonAction::ShowPersonas => self.show_personas(chat).await,
            ButtonAction::SetPersona(persona) => {
                self.new_dialog(&mut account, chat, Some(persona)).await?
            }
            ButtonAction::NewDialog => self.new_dialog(&mut account, chat, None).await?,
            ButtonAction::Retry => {
                self.retry(msg).await?;
            }
            ButtonAction::Buy => self.send_invoice(chat).await,
            ButtonAction::Balance => self.show_balance(&mut account, chat).await?,
        }
        Ok(())
    }

    /// Credits the package and marks the account as paying.
    pub(crate) async fn handle_payment(
        &self,
        msg: &InboundMessage,
        receipt: &PaymentReceipt,
    ) -> Result<(), ParleyError> {
        let package = &self.config.billing.package;
        let mut account = self.admit(&msg.sender).await?;
        if receipt.payload != package.payload {
            warn!(
                user_id = account.id().0,
                payload = receipt.payload.as_str(),
                charge_id = receipt.charge_id.as_str(),
                "payment for unknown payload ignored"
            );
            return Ok(());
        }

        let balance = self.ledger.credit(account.id(), package.tokens).await?;
        account.observe_balance(balance);
        self.update_user(&mut account, UserUpdate::Paying(true))
            .await?;
        info!(
            user_id = account.id().0,
            amount = receipt.total_amount,
            currency = receipt.currency.as_str(),
            charge_id = receipt.charge_id.as_str(),
            "payment credited"
        );
        self.notify(OutboundMessage::html(
            msg.chat_id,
            notices::payment_received(package.tokens, balance),
        ))
        .await;
        Ok(())
    }

    /// Starts a new dialog, optionally switching persona first. Refused
    /// while a request of the same user is in flight.
    async fn new_dialog(
        &self,
        account: &mut UserAccount,
        chat: ChatId,
        persona_change: Option<PersonaId>,
    ) -> Result<(), ParleyError> {
        let Some(_permit) = self.enter(account.id(), chat).await else {
            return Ok(());
        };
        let mut account = self.reload(account.id()).await?;
        if let Some(persona_id) = persona_change {
            self.update_user(&mut account, UserUpdate::Persona(persona_id))
                .await?;
        }
        self.touch(&mut account, Utc::now()).await?;
        self.dialogs.start_new_dialog(&mut account).await?;

        if persona_change.is_none() {
            self.notify(OutboundMessage::text(chat, notices::NEW_DIALOG))
                .await;
        }
        let persona = persona(account.persona());
        self.notify(OutboundMessage::html(chat, persona.welcome))
            .await;
        Ok(())
    }

    async fn show_personas(&self, chat: ChatId) {
        self.notify(
            OutboundMessage::text(chat, notices::SELECT_PERSONA)
                .with_keyboard(notices::persona_keyboard()),
        )
        .await;
    }

    /// Balance and prices, refreshing a stale FX quote first.
    async fn show_balance(
        &self,
        account: &mut UserAccount,
        chat: ChatId,
    ) -> Result<(), ParleyError> {
        if let Some(quote) = self.rates.refresh(account.fx_quote(), Utc::now()).await {
            self.update_user(account, UserUpdate::Fx(quote)).await?;
        }
        let lines = self.prices.lines(account.fx_quote().rate);
        let currency = &self.config.billing.package.currency;
        self.notify(
            OutboundMessage::html(chat, notices::balance(account, currency, &lines))
                .with_keyboard(notices::buy_keyboard()),
        )
        .await;
        Ok(())
    }

    async fn send_invoice(&self, chat: ChatId) {
        if !self.channel.capabilities().supports_payments {
            self.notify(OutboundMessage::text(chat, notices::PAYMENTS_UNAVAILABLE))
                .await;
            return;
        }
        let package = &self.config.billing.package;
        let invoice = Invoice {
            chat_id: chat,
            title: package.title.clone(),
            description: package.description.clone(),
            payload: package.payload.clone(),
            currency: package.currency.clone(),
            price_minor: package.price_minor,
            label: format!("{} tokens", package.tokens),
        };
        if let Err(e) = self.channel.send_invoice(invoice).await {
            warn!(chat_id = chat.0, error = %e, "invoice not delivered");
            self.notify(OutboundMessage::text(chat, notices::PAYMENTS_UNAVAILABLE))
                .await;
        }
    }

    /// Sends `text` to every user's private chat. Returns (delivered, failed).
    async fn broadcast(&self, text: &str) -> Result<(usize, usize), ParleyError> {
        let accounts = self.storage.list_users().await?;
        let mut delivered = 0;
        let mut failed = 0;
        for account in &accounts {
            let chat = ChatId(account.id().0);
            match self.channel.send(OutboundMessage::html(chat, text)).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(user_id = account.id().0, error = %e, "broadcast not delivered");
                }
            }
        }
        info!(delivered, failed, "broadcast finished");
        Ok((delivered, failed))
    }

    /// Raises every balance below the refill floor and tells those users.
    pub async fn refill_now(&self) -> Result<usize, ParleyError> {
        let floor = self.config.billing.refill_floor;
        let refilled: Vec<UserId> = self.ledger.refill_all(floor).await?;
        for user in &refilled {
            self.notify(OutboundMessage::html(ChatId(user.0), notices::refilled(floor)))
                .await;
        }
        Ok(refilled.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{FxQuote, UserProfile};

    #[test]
    fn csv_export_has_header_and_one_row_per_user() {
        let now = Utc::now();
        let accounts: Vec<UserAccount> = [1, 2]
            .into_iter()
            .map(|id| {
                UserAccount::register(
                    UserId(id),
                    UserProfile {
                        first_name: Some("Ann, Jr".into()),
                        last_name: None,
                        username: Some(format!("user{id}")),
                    },
                    100,
                    PersonaId::Assistant,
                    FxQuote { rate: 75.0, as_of: now },
                    now,
                )
            })
            .collect();

        let data = String::from_utf8(users_csv(&accounts).unwrap()).unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("number,id,username"));
        assert!(lines[1].starts_with("1,1,user1,\"Ann, Jr\","));
        assert!(lines[2].ends_with(",0,100,false"));
    }
}
