// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update filtering and conversion.
//!
//! Decides whether an incoming Telegram update is addressed to the bot and
//! converts it into a channel-agnostic [`InboundMessage`].

use chrono::Utc;
use parley_core::MessageId;
use parley_core::types::{
    ButtonAction, ChatId, ChatKind, InboundContent, InboundMessage, PaymentReceipt, Sender,
    UserId, UserProfile,
};
use teloxide::types::{CallbackQuery, Chat, Message, PreCheckoutQuery, SuccessfulPayment, User};

/// Checks whether the sender may talk to the bot.
///
/// An empty `allowed_users` list admits everyone. Entries match the user
/// id or the username, with or without a leading `@`. Updates without a
/// sender are never authorized.
pub fn is_authorized(user: Option<&User>, allowed_users: &[String]) -> bool {
    let Some(user) = user else {
        return false;
    };
    if allowed_users.is_empty() {
        return true;
    }

    let user_id = user.id.0.to_string();
    allowed_users.iter().any(|allowed| {
        if *allowed == user_id {
            return true;
        }
        let allowed = allowed.strip_prefix('@').unwrap_or(allowed);
        user.username
            .as_deref()
            .is_some_and(|username| username.eq_ignore_ascii_case(allowed))
    })
}

pub fn chat_kind(chat: &Chat) -> ChatKind {
    match chat.is_private() {
        true => ChatKind::Private,
        false => ChatKind::Group,
    }
}

/// The text of a message if it is addressed to the bot.
///
/// Private messages and commands always are. Other group messages must
/// start with `trigger` (case-insensitive), which is stripped.
pub fn addressed_text(text: &str, kind: ChatKind, trigger: &str) -> Option<String> {
    let text = text.trim();
    if kind == ChatKind::Private || text.starts_with('/') {
        return Some(text.to_string());
    }
    strip_prefix_ignore_case(text, trigger.trim()).map(str::to_string)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    let split = text
        .char_indices()
        .nth(prefix.chars().count())
        .map_or(text.len(), |(idx, _)| idx);
    let (head, rest) = text.split_at(split);
    (head.to_lowercase() == prefix.to_lowercase()).then(|| rest.trim())
}

pub fn sender(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        profile: UserProfile {
            first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        },
    }
}

pub fn payment_receipt(payment: &SuccessfulPayment) -> PaymentReceipt {
    PaymentReceipt {
        payload: payment.invoice_payload.clone(),
        currency: payment.currency.to_string(),
        total_amount: i64::from(payment.total_amount),
        charge_id: format!("{:?}", payment.telegram_payment_charge_id),
    }
}

/// Content of a text or payment message, `None` when the bot should
/// stay silent. Voice notes are handled by [`crate::media`].
pub fn message_content(msg: &Message, group_trigger: &str) -> Option<InboundContent> {
    if let Some(payment) = msg.successful_payment() {
        return Some(InboundContent::PaymentSucceeded(payment_receipt(payment)));
    }
    let text = msg.text()?;
    addressed_text(text, chat_kind(&msg.chat), group_trigger).map(InboundContent::Text)
}

/// Wraps message content into an [`InboundMessage`]. `None` without a sender.
pub fn to_inbound(msg: &Message, content: InboundContent) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;
    Some(InboundMessage {
        id: MessageId(msg.id.0.to_string()),
        chat_id: ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
        sender: sender(user),
        content,
        timestamp: msg.date,
    })
}

/// Converts an inline keyboard press. Unknown callback data and presses
/// on messages the bot can no longer see are dropped.
pub fn callback_inbound(query: &CallbackQuery) -> Option<InboundMessage> {
    let action = ButtonAction::decode(query.data.as_deref()?)?;
    let message = query.message.as_ref()?;
    let chat = message.chat();
    let message_id = MessageId(message.id().0.to_string());

    Some(InboundMessage {
        id: message_id.clone(),
        chat_id: ChatId(chat.id.0),
        chat_kind: chat_kind(chat),
        sender: sender(&query.from),
        content: InboundContent::Button {
            action,
            message_id: Some(message_id),
        },
        timestamp: Utc::now(),
    })
}

/// Only invoices for the configured package may be paid.
pub fn pre_checkout_accepted(query: &PreCheckoutQuery, package_payload: &str) -> bool {
    query.invoice_payload == package_payload
}
