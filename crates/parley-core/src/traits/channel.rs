// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging gateway trait (Telegram and test doubles).

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelCapabilities, ChatId, InboundMessage, Invoice, MessageId, OutboundMessage,
    OutputFormat, Presence,
};

/// Adapter for a bidirectional messaging platform.
///
/// Implementations recover locally from payload rejections (markup the
/// platform refuses, edits that change nothing) by resending as plain text.
/// Callers only see an error when delivery is impossible.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Establishes a connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), ParleyError>;

    /// Receives the next inbound event.
    async fn receive(&self) -> Result<InboundMessage, ParleyError>;

    /// Sends a text message and returns its platform id.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ParleyError>;

    /// Replaces the text of a previously sent message.
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: &MessageId,
        text: &str,
        format: OutputFormat,
    ) -> Result<(), ParleyError>;

    /// Shows a presence hint such as "typing".
    async fn send_presence(&self, chat_id: ChatId, presence: Presence) -> Result<(), ParleyError>;

    /// Sends a photo by URL.
    async fn send_photo(
        &self,
        chat_id: ChatId,
        url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError>;

    /// Sends a voice note.
    async fn send_voice(
        &self,
        chat_id: ChatId,
        audio: Vec<u8>,
        reply_to: Option<&MessageId>,
    ) -> Result<MessageId, ParleyError>;

    /// Sends a file attachment.
    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError>;

    /// Sends a payment invoice.
    async fn send_invoice(&self, invoice: Invoice) -> Result<MessageId, ParleyError>;
}
