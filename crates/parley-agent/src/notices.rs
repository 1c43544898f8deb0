// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing texts and keyboards.

use parley_context::persona::{Persona, catalog};
use parley_core::types::{Button, ButtonAction, UserAccount};
use parley_cost::PriceLine;

pub const STILL_PROCESSING: &str =
    "⏳ Please wait for a reply to the previous message, or start over with /new";
pub const NOTHING_TO_RETRY: &str = "There are no messages to retry 🤷";
pub const EDITING_UNSUPPORTED: &str = "🥲 Unfortunately, editing messages is not supported";
pub const VOICE_IN_GROUP: &str =
    "Voice messages are not recognized in groups. Message me directly to use this feature.";
pub const SPEAK_REFUSED: &str =
    "🥲 That answer contains code, which I can't read aloud. Ask for it as text instead.";
pub const EMPTY_ANSWER: &str = "🥲 The model returned an empty answer. Try rephrasing with /retry.";
pub const EMPTY_PROMPT: &str = "Please add a request after the command word.";
pub const ADMIN_ONLY: &str = "This command is only available to administrators.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. See /help for what I can do.";
pub const PAYMENTS_UNAVAILABLE: &str = "Payments are not available right now.";
pub const SELECT_PERSONA: &str = "Select a chat mode:";

pub const HELP: &str = "<b>Commands</b>
/new – start a new dialog
/mode – select chat mode
/retry – regenerate the answer to the last message
/balance – show balance and prices
/buy – top up your balance
/profile – your account
/help – show this message

🎤 You can send <b>voice messages</b> instead of text.
🎨 Start a message with <code>{image}</code> to get a picture.
🔊 Start a message with <code>{speak}</code> to get a voice reply.";

/// Usage text with the configured trigger words.
pub fn help(image_prefix: &str, speak_prefix: &str) -> String {
    HELP.replace("{image}", image_prefix)
        .replace("{speak}", speak_prefix)
}

pub fn welcome(name: &str, balance: i64) -> String {
    let greeting = match name.is_empty() {
        true => "Hi!".to_string(),
        false => format!("Hi, {name}!"),
    };
    format!("{greeting} I'm a chat bot powered by a large language model 🤖\n\nYour balance: <b>{balance}</b> tokens.")
}

pub fn balance_exhausted() -> String {
    "🥲 Your balance is exhausted. It is refilled every day, or you can top it up right now with /buy.".to_string()
}

pub fn new_dialog_started(persona: &Persona) -> String {
    format!("Starting new dialog due to timeout (<b>{}</b> mode) ✅", persona.name)
}

pub const NEW_DIALOG: &str = "New dialog started ✅";

pub fn generation_failed(detail: &str) -> String {
    format!("Something went wrong while answering. Error: {detail}")
}

pub fn truncated(dropped: usize) -> String {
    match dropped {
        1 => "✍️ <i>Note:</i> your current dialog is too long, so the <b>first message</b> was removed from the context.\nSend /new to start a new dialog".to_string(),
        n => format!("✍️ <i>Note:</i> your current dialog is too long, so <b>{n} first messages</b> were removed from the context.\nSend /new to start a new dialog"),
    }
}

pub fn transcribed(text: &str) -> String {
    format!("🎤: <i>{}</i>", escape_html(text))
}

pub fn profile(account: &UserAccount, persona: &Persona) -> String {
    let name = account.profile().display_name();
    format!(
        "<b>Profile</b>\nID: <code>{}</code>\nName: {}\nBalance: <b>{}</b> tokens\nUsed in total: {} tokens\nChat mode: {}",
        account.id(),
        escape_html(&name),
        account.balance(),
        account.total_used(),
        persona.name,
    )
}

pub fn balance(account: &UserAccount, currency: &str, lines: &[PriceLine]) -> String {
    let rate = account.fx_quote().rate;
    let mut text = format!(
        "You have <b>{}</b> tokens left.\n\nExchange rate: 1 USD = {rate:.2} {currency}\n\n<b>Prices</b>\n",
        account.balance()
    );
    for line in lines {
        text.push_str(&format!(
            "• {}: ${:.4} ({:.2} {currency})\n",
            line.label, line.usd, line.local
        ));
    }
    text
}

pub fn payment_received(tokens: i64, balance: i64) -> String {
    format!("Thank you for your purchase! 🎉 {tokens} tokens added, your balance is now <b>{balance}</b>.")
}

pub fn refilled(balance: i64) -> String {
    format!("☀️ Your daily balance has been refilled to <b>{balance}</b> tokens.")
}

pub fn broadcast_summary(delivered: usize, failed: usize) -> String {
    format!("Broadcast finished: {delivered} delivered, {failed} failed.")
}

pub fn refill_summary(count: usize) -> String {
    format!("Refilled {count} account(s).")
}

/// Minimal escaping for text interpolated into HTML-formatted messages.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn main_keyboard() -> Vec<Vec<Button>> {
    vec![
        vec![
            Button::new("🆕 New dialog", ButtonAction::NewDialog),
            Button::new("🎭 Chat mode", ButtonAction::ShowPersonas),
        ],
        vec![
            Button::new("💰 Balance", ButtonAction::Balance),
            Button::new("🛒 Buy tokens", ButtonAction::Buy),
        ],
    ]
}

pub fn retry_keyboard() -> Vec<Vec<Button>> {
    vec![vec![Button::new("🔄 Retry", ButtonAction::Retry)]]
}

pub fn buy_keyboard() -> Vec<Vec<Button>> {
    vec![vec![Button::new("🛒 Buy tokens", ButtonAction::Buy)]]
}

/// One persona per row.
pub fn persona_keyboard() -> Vec<Vec<Button>> {
    catalog()
        .map(|p| vec![Button::new(p.name, ButtonAction::SetPersona(p.id))])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::PersonaId;

    #[test]
    fn truncation_notice_distinguishes_one_from_many() {
        assert!(truncated(1).contains("first message</b> was"));
        assert!(truncated(3).contains("3 first messages"));
    }

    #[test]
    fn help_mentions_trigger_words() {
        let text = help("Draw", "Say");
        assert!(text.contains("<code>Draw</code>"));
        assert!(text.contains("<code>Say</code>"));
    }

    #[test]
    fn persona_keyboard_lists_the_catalog() {
        let keyboard = persona_keyboard();
        assert_eq!(keyboard.len(), 5);
        assert_eq!(
            keyboard[0][0].action,
            ButtonAction::SetPersona(PersonaId::Assistant)
        );
    }

    #[test]
    fn transcription_echo_is_escaped() {
        assert_eq!(transcribed("a<b"), "🎤: <i>a&lt;b</i>");
    }
}
