// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for Parley.
//!
//! Implements [`ChannelAdapter`] for the Telegram Bot API via teloxide:
//! long polling for messages, edits, keyboard callbacks and payments;
//! HTML delivery with a plain-text fallback; photos, voice notes,
//! documents and invoices.

pub mod handler;
pub mod media;

use std::sync::Arc;

use async_trait::async_trait;
use parley_config::model::TelegramConfig;
use parley_core::types::{
    AdapterType, Button, ChannelCapabilities, ChatId, HealthStatus, InboundContent,
    InboundMessage, Invoice, MessageId, OutboundMessage, OutputFormat, Presence,
};
use parley_core::{ChannelAdapter, ParleyError, PluginAdapter};
use teloxide::ApiError;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, CallbackQuery, ChatAction, ChatId as TgChatId, InlineKeyboardButton,
    InlineKeyboardMarkup, InputFile, LabeledPrice, MessageId as TgMessageId, ParseMode,
    PreCheckoutQuery, ReplyParameters,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Longest text Telegram accepts in one message.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Shared state of the update handlers.
struct Intake {
    tx: mpsc::Sender<InboundMessage>,
    allowed_users: Vec<String>,
    group_trigger: String,
    invoice_payload: String,
}

impl Intake {
    async fn forward(&self, inbound: InboundMessage) {
        if self.tx.send(inbound).await.is_err() {
            warn!("inbound channel closed, dropping update");
        }
    }
}

/// Telegram channel adapter implementing [`ChannelAdapter`].
pub struct TelegramChannel {
    bot: Bot,
    config: TelegramConfig,
    invoice_payload: String,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    polling_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TelegramChannel {
    /// Creates a new Telegram channel adapter.
    ///
    /// Requires `config.bot_token`. Pre-checkout queries are accepted only
    /// for `invoice_payload`.
    pub fn new(
        config: TelegramConfig,
        invoice_payload: impl Into<String>,
    ) -> Result<Self, ParleyError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ParleyError::Config("telegram.bot_token is required for Telegram adapter".into())
        })?;

        if token.is_empty() {
            return Err(ParleyError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let bot = Bot::new(token);
        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            bot,
            config,
            invoice_payload: invoice_payload.into(),
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
            polling_handle: None,
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn register_commands(&self) {
        let commands = vec![
            BotCommand::new("new", "Start new dialog"),
            BotCommand::new("mode", "Select chat mode"),
            BotCommand::new("retry", "Re-generate response for previous query"),
            BotCommand::new("balance", "Show balance"),
            BotCommand::new("buy", "Top up balance"),
            BotCommand::new("profile", "Show profile"),
            BotCommand::new("help", "Show help message"),
        ];
        if let Err(e) = self.bot.set_my_commands(commands).await {
            warn!(error = %e, "failed to register the command menu");
        }
    }

    async fn send_once(
        &self,
        msg: &OutboundMessage,
        parse_mode: Option<ParseMode>,
    ) -> Result<Message, teloxide::RequestError> {
        let mut request = self.bot.send_message(tg_chat(msg.chat_id), msg.text.clone());
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        if let Some(reply_to) = msg.reply_to.as_ref().and_then(|id| tg_message_id(id).ok()) {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        if !msg.keyboard.is_empty() {
            request = request.reply_markup(keyboard_markup(&msg.keyboard));
        }
        request.await
    }
}

async fn on_message(bot: Bot, msg: Message, intake: Arc<Intake>) -> ResponseResult<()> {
    if !handler::is_authorized(msg.from.as_ref(), &intake.allowed_users) {
        debug!(chat_id = msg.chat.id.0, "ignoring unauthorized user");
        return respond(());
    }

    let content = match msg.voice() {
        Some(voice) => {
            match media::voice_content(&bot, voice, handler::chat_kind(&msg.chat)).await {
                Ok(content) => Some(content),
                Err(e) => {
                    error!(error = %e, "failed to download voice note");
                    None
                }
            }
        }
        None => handler::message_content(&msg, &intake.group_trigger),
    };

    match content.and_then(|content| handler::to_inbound(&msg, content)) {
        Some(inbound) => intake.forward(inbound).await,
        None => debug!(msg_id = msg.id.0, "ignoring message"),
    }
    respond(())
}

async fn on_edited(msg: Message, intake: Arc<Intake>) -> ResponseResult<()> {
    if !handler::is_authorized(msg.from.as_ref(), &intake.allowed_users) {
        return respond(());
    }
    // Group edits count only when the edited text still addresses the bot.
    let addressed = msg.chat.is_private()
        || msg.text().is_some_and(|text| {
            handler::addressed_text(text, handler::chat_kind(&msg.chat), &intake.group_trigger)
                .is_some()
        });
    if addressed && let Some(inbound) = handler::to_inbound(&msg, InboundContent::Edited) {
        intake.forward(inbound).await;
    }
    respond(())
}

async fn on_callback(bot: Bot, query: CallbackQuery, intake: Arc<Intake>) -> ResponseResult<()> {
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        debug!(error = %e, "failed to answer callback query");
    }
    if !handler::is_authorized(Some(&query.from), &intake.allowed_users) {
        return respond(());
    }
    match handler::callback_inbound(&query) {
        Some(inbound) => intake.forward(inbound).await,
        None => debug!(data = ?query.data, "ignoring callback query"),
    }
    respond(())
}

async fn on_pre_checkout(
    bot: Bot,
    query: PreCheckoutQuery,
    intake: Arc<Intake>,
) -> ResponseResult<()> {
    if handler::pre_checkout_accepted(&query, &intake.invoice_payload) {
        info!(user_id = query.from.id.0, "pre-checkout accepted");
        bot.answer_pre_checkout_query(query.id, true).await?;
    } else {
        warn!(
            user_id = query.from.id.0,
            payload = query.invoice_payload.as_str(),
            "pre-checkout refused: unknown payload"
        );
        bot.answer_pre_checkout_query(query.id, false)
            .error_message("This invoice is no longer valid.".to_string())
            .await?;
    }
    respond(())
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("Telegram channel shutting down");
        if let Some(handle) = &self.polling_handle {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_edit: true,
            supports_presence: true,
            supports_payments: self.config.payment_provider_token.is_some(),
            max_message_length: Some(MAX_MESSAGE_LENGTH),
        }
    }

    async fn connect(&mut self) -> Result<(), ParleyError> {
        if self.polling_handle.is_some() {
            return Ok(());
        }

        self.register_commands().await;

        let bot = self.bot.clone();
        let intake = Arc::new(Intake {
            tx: self.inbound_tx.clone(),
            allowed_users: self.config.allowed_users.clone(),
            group_trigger: self.config.group_trigger.clone(),
            invoice_payload: self.invoice_payload.clone(),
        });

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(on_message))
                .branch(Update::filter_edited_message().endpoint(on_edited))
                .branch(Update::filter_callback_query().endpoint(on_callback))
                .branch(Update::filter_pre_checkout_query().endpoint(on_pre_checkout));

            Dispatcher::builder(bot, handler)
                .dependencies(dptree::deps![intake])
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
        });

        self.polling_handle = Some(handle);
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ParleyError> {
        let sent = match msg.format {
            OutputFormat::Html => match self.send_once(&msg, Some(ParseMode::Html)).await {
                Ok(sent) => Ok(sent),
                Err(e) if rejection(&e) == Rejection::Payload => {
                    warn!(error = %e, "HTML message rejected, sending as plain text");
                    self.send_once(&msg, None).await
                }
                Err(e) => Err(e),
            },
            OutputFormat::Plain => self.send_once(&msg, None).await,
        }
        .map_err(|e| request_error("failed to send message", e))?;

        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn receive(&self) -> Result<InboundMessage, ParleyError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| ParleyError::Channel {
            message: "Telegram inbound channel closed".into(),
            source: None,
        })
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: &MessageId,
        text: &str,
        format: OutputFormat,
    ) -> Result<(), ParleyError> {
        let chat = tg_chat(chat_id);
        let msg_id = tg_message_id(message_id)?;

        let mut request = self.bot.edit_message_text(chat, msg_id, text);
        if format == OutputFormat::Html {
            request = request.parse_mode(ParseMode::Html);
        }
        match request.await {
            Ok(_) => Ok(()),
            Err(e) => match rejection(&e) {
                Rejection::Unchanged => Ok(()),
                Rejection::Payload if format == OutputFormat::Html => {
                    warn!(error = %e, "HTML edit rejected, retrying as plain text");
                    match self.bot.edit_message_text(chat, msg_id, text).await {
                        Ok(_) => Ok(()),
                        Err(e) if rejection(&e) == Rejection::Unchanged => Ok(()),
                        Err(e) => Err(request_error("failed to edit message", e)),
                    }
                }
                _ => Err(request_error("failed to edit message", e)),
            },
        }
    }

    async fn send_presence(&self, chat_id: ChatId, presence: Presence) -> Result<(), ParleyError> {
        let action = match presence {
            Presence::Typing => ChatAction::Typing,
            Presence::RecordVoice => ChatAction::RecordVoice,
            Presence::UploadPhoto => ChatAction::UploadPhoto,
        };
        self.bot
            .send_chat_action(tg_chat(chat_id), action)
            .await
            .map_err(|e| channel_error("failed to send chat action", e))?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError> {
        let url = reqwest::Url::parse(url).map_err(|e| ParleyError::Channel {
            message: format!("invalid image url: {e}"),
            source: Some(Box::new(e)),
        })?;
        let mut request = self.bot.send_photo(tg_chat(chat_id), InputFile::url(url));
        if let Some(caption) = caption {
            request = request.caption(caption.to_string());
        }
        let sent = request
            .await
            .map_err(|e| channel_error("failed to send photo", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn send_voice(
        &self,
        chat_id: ChatId,
        audio: Vec<u8>,
        reply_to: Option<&MessageId>,
    ) -> Result<MessageId, ParleyError> {
        let file = InputFile::memory(audio).file_name("voice.ogg");
        let mut request = self.bot.send_voice(tg_chat(chat_id), file);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(tg_message_id(reply_to)?));
        }
        let sent = request
            .await
            .map_err(|e| channel_error("failed to send voice note", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError> {
        let file = InputFile::memory(data).file_name(file_name.to_string());
        let mut request = self.bot.send_document(tg_chat(chat_id), file);
        if let Some(caption) = caption {
            request = request.caption(caption.to_string());
        }
        let sent = request
            .await
            .map_err(|e| channel_error("failed to send document", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn send_invoice(&self, invoice: Invoice) -> Result<MessageId, ParleyError> {
        let token = self
            .config
            .payment_provider_token
            .clone()
            .ok_or_else(|| ParleyError::Config("telegram.payment_provider_token is not set".into()))?;
        let amount = u32::try_from(invoice.price_minor).map_err(|_| {
            ParleyError::Internal(format!("invoice amount out of range: {}", invoice.price_minor))
        })?;
        let prices = vec![LabeledPrice {
            label: invoice.label,
            amount,
        }];

        let sent = self
            .bot
            .send_invoice(
                tg_chat(invoice.chat_id),
                invoice.title,
                invoice.description,
                invoice.payload,
                invoice.currency,
                prices,
            )
            .provider_token(token)
            .await
            .map_err(|e| channel_error("failed to send invoice", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }
}

fn tg_chat(chat: ChatId) -> TgChatId {
    TgChatId(chat.0)
}

fn tg_message_id(id: &MessageId) -> Result<TgMessageId, ParleyError> {
    id.0.parse::<i32>()
        .map(TgMessageId)
        .map_err(|e| ParleyError::Channel {
            message: format!("invalid message_id: {e}"),
            source: None,
        })
}

fn keyboard_markup(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.action.encode()))
            .collect::<Vec<_>>()
    }))
}

/// How Telegram refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// The edit would not change the message.
    Unchanged,
    /// The Bot API refused the payload itself (markup, length, entities).
    Payload,
    /// Network, rate limit or other non-payload failure.
    Other,
}

fn rejection(e: &teloxide::RequestError) -> Rejection {
    match e {
        teloxide::RequestError::Api(ApiError::MessageNotModified) => Rejection::Unchanged,
        teloxide::RequestError::Api(api) if api.to_string().contains("message is not modified") => {
            Rejection::Unchanged
        }
        teloxide::RequestError::Api(_) => Rejection::Payload,
        _ => Rejection::Other,
    }
}

/// Payload refusals become [`ParleyError::TransportRejected`], everything
/// else [`ParleyError::Channel`].
fn request_error(context: &str, e: teloxide::RequestError) -> ParleyError {
    match rejection(&e) {
        Rejection::Other => channel_error(context, e),
        Rejection::Unchanged | Rejection::Payload => ParleyError::TransportRejected {
            message: format!("{context}: {e}"),
            source: Some(Box::new(e)),
        },
    }
}

fn channel_error(context: &str, e: teloxide::RequestError) -> ParleyError {
    ParleyError::Channel {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ButtonAction;

    fn config(token: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(str::to_string),
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn new_requires_bot_token() {
        assert!(TelegramChannel::new(config(None), "payload").is_err());
    }

    #[test]
    fn new_rejects_empty_token() {
        assert!(TelegramChannel::new(config(Some("")), "payload").is_err());
    }

    #[test]
    fn new_accepts_valid_token() {
        let channel =
            TelegramChannel::new(config(Some("123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11")), "p");
        assert!(channel.is_ok());
    }

    #[test]
    fn payments_depend_on_provider_token() {
        let channel = TelegramChannel::new(config(Some("test:token")), "p").unwrap();
        let caps = channel.capabilities();
        assert!(caps.supports_edit);
        assert!(caps.supports_presence);
        assert!(!caps.supports_payments);
        assert_eq!(caps.max_message_length, Some(4096));

        let mut with_payments = config(Some("test:token"));
        with_payments.payment_provider_token = Some("provider".into());
        let channel = TelegramChannel::new(with_payments, "p").unwrap();
        assert!(channel.capabilities().supports_payments);
    }

    #[test]
    fn message_ids_round_trip() {
        assert_eq!(tg_message_id(&MessageId("42".into())).unwrap(), TgMessageId(42));
        assert!(tg_message_id(&MessageId("mock-msg-1".into())).is_err());
    }

    #[test]
    fn keyboard_rows_keep_their_shape() {
        let rows = vec![
            vec![Button::new("Retry", ButtonAction::Retry)],
            vec![
                Button::new("Buy", ButtonAction::Buy),
                Button::new("Balance", ButtonAction::Balance),
            ],
        ];
        let markup = keyboard_markup(&rows);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1].len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "Retry");
    }

    #[test]
    fn unchanged_edit_is_not_a_failure() {
        let e = teloxide::RequestError::Api(ApiError::MessageNotModified);
        assert_eq!(rejection(&e), Rejection::Unchanged);
    }

    #[test]
    fn any_api_refusal_is_a_payload_rejection() {
        let bad_markup = teloxide::RequestError::Api(ApiError::CantParseEntities(
            "Bad Request: can't parse entities".into(),
        ));
        assert_eq!(rejection(&bad_markup), Rejection::Payload);
        let empty = teloxide::RequestError::Api(ApiError::MessageTextIsEmpty);
        assert_eq!(rejection(&empty), Rejection::Payload);

        assert!(matches!(
            request_error("failed to send message", bad_markup),
            ParleyError::TransportRejected { .. }
        ));
    }

    #[test]
    fn non_api_failures_stay_channel_errors() {
        let e = teloxide::RequestError::MigrateToChatId(TgChatId(-100));
        assert_eq!(rejection(&e), Rejection::Other);
        assert!(matches!(
            request_error("failed to send message", e),
            ParleyError::Channel { .. }
        ));
    }

    #[test]
    fn plugin_adapter_metadata() {
        let channel = TelegramChannel::new(config(Some("test:token")), "p").unwrap();
        assert_eq!(channel.name(), "telegram");
        assert_eq!(channel.version(), semver::Version::new(0, 1, 0));
        assert_eq!(channel.adapter_type(), AdapterType::Channel);
    }
}
