// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental answer delivery with throttled edits.

use std::time::Duration;

use parley_core::types::{ChatId, OutboundMessage, OutputFormat};
use parley_core::{ChannelAdapter, MessageId, ParleyError};
use parley_config::model::DialogConfig;
use tracing::{debug, warn};

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Sends the first partial answer, then edits it in place.
///
/// A partial is emitted only after the answer has grown by `delta_chars`
/// since the last emission. Empty text is never sent. [`finish`] always
/// emits the final text.
///
/// [`finish`]: AnswerDelivery::finish
pub struct AnswerDelivery<'a> {
    channel: &'a dyn ChannelAdapter,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    format: OutputFormat,
    delta_chars: usize,
    pause: Duration,
    max_chars: usize,
    supports_edit: bool,
    sent: Option<MessageId>,
    last_len: usize,
    last_text: String,
}

impl<'a> AnswerDelivery<'a> {
    pub fn new(
        channel: &'a dyn ChannelAdapter,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        format: OutputFormat,
        config: &DialogConfig,
    ) -> Self {
        let caps = channel.capabilities();
        let max_chars = caps
            .max_message_length
            .map_or(config.max_message_chars, |limit| limit.min(config.max_message_chars));
        Self {
            channel,
            chat_id,
            reply_to,
            format,
            delta_chars: config.stream_edit_delta_chars.max(1),
            pause: Duration::from_millis(config.stream_edit_pause_ms),
            max_chars,
            supports_edit: caps.supports_edit,
            sent: None,
            last_len: 0,
            last_text: String::new(),
        }
    }

    /// Id of the message carrying the answer, once one was sent.
    pub fn message_id(&self) -> Option<&MessageId> {
        self.sent.as_ref()
    }

    /// Offers the accumulated answer so far. Transport failures are logged
    /// and do not interrupt the generation.
    pub async fn partial(&mut self, answer: &str) {
        if !self.supports_edit || answer.trim().is_empty() {
            return;
        }
        let len = answer.chars().count();
        if self.sent.is_some() && len.saturating_sub(self.last_len) < self.delta_chars {
            return;
        }
        if let Err(e) = self.emit(answer).await {
            warn!(chat_id = self.chat_id.0, error = %e, "partial answer not delivered");
            return;
        }
        self.last_len = len;
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Delivers the final answer.
    pub async fn finish(&mut self, answer: &str) -> Result<(), ParleyError> {
        self.emit(answer).await?;
        self.last_len = answer.chars().count();
        Ok(())
    }

    async fn emit(&mut self, answer: &str) -> Result<(), ParleyError> {
        let text = truncate_chars(answer, self.max_chars);
        if text == self.last_text {
            return Ok(());
        }
        match &self.sent {
            Some(id) => {
                self.channel
                    .edit_message(self.chat_id, id, text, self.format)
                    .await?;
            }
            None => {
                let mut out = OutboundMessage::text(self.chat_id, text).with_format(self.format);
                if let Some(reply_to) = self.reply_to.clone() {
                    out = out.reply_to(reply_to);
                }
                let id = self.channel.send(out).await?;
                debug!(chat_id = self.chat_id.0, "answer message sent");
                self.sent = Some(id);
            }
        }
        self.last_text = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_test_utils::MockChannel;

    fn config(delta: usize, max_chars: usize) -> DialogConfig {
        DialogConfig {
            stream_edit_delta_chars: delta,
            stream_edit_pause_ms: 0,
            max_message_chars: max_chars,
            ..DialogConfig::default()
        }
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[tokio::test]
    async fn partials_are_throttled_by_delta() {
        let channel = MockChannel::new();
        let cfg = config(5, 4096);
        let mut delivery = AnswerDelivery::new(&channel, ChatId(1), None, OutputFormat::Plain, &cfg);

        delivery.partial("ab").await;
        delivery.partial("abcd").await;
        delivery.partial("abcdefg").await;
        delivery.finish("abcdefgh").await.unwrap();

        assert_eq!(channel.sent_messages().await.len(), 1);
        assert_eq!(channel.sent_messages().await[0].text, "ab");
        let edits: Vec<String> = channel.edits().await.into_iter().map(|e| e.text).collect();
        assert_eq!(edits, vec!["abcdefg".to_string(), "abcdefgh".to_string()]);
    }

    #[tokio::test]
    async fn empty_first_partial_is_not_sent() {
        let channel = MockChannel::new();
        let cfg = config(1, 4096);
        let mut delivery = AnswerDelivery::new(&channel, ChatId(1), None, OutputFormat::Html, &cfg);

        delivery.partial("").await;
        delivery.partial("   ").await;
        assert!(channel.sent_messages().await.is_empty());

        delivery.partial("Hello").await;
        assert_eq!(channel.sent_messages().await.len(), 1);
        assert_eq!(channel.sent_messages().await[0].format, OutputFormat::Html);
    }

    #[tokio::test]
    async fn final_text_is_truncated_for_display() {
        let channel = MockChannel::new();
        let cfg = config(100, 5);
        let mut delivery = AnswerDelivery::new(&channel, ChatId(1), None, OutputFormat::Plain, &cfg);

        delivery.finish("0123456789").await.unwrap();
        assert_eq!(channel.sent_messages().await[0].text, "01234");
    }

    #[tokio::test]
    async fn unchanged_final_text_is_not_edited_again() {
        let channel = MockChannel::new();
        let cfg = config(1, 4096);
        let mut delivery = AnswerDelivery::new(&channel, ChatId(1), None, OutputFormat::Plain, &cfg);

        delivery.partial("done").await;
        delivery.finish("done").await.unwrap();
        assert_eq!(channel.sent_messages().await.len(), 1);
        assert!(channel.edits().await.is_empty());
    }

    #[tokio::test]
    async fn channels_without_edit_get_only_the_final_answer() {
        let channel = MockChannel::without_edit();
        let cfg = config(1, 4096);
        let mut delivery = AnswerDelivery::new(&channel, ChatId(1), None, OutputFormat::Plain, &cfg);

        delivery.partial("par").await;
        delivery.finish("partial and final").await.unwrap();
        assert_eq!(channel.sent_messages().await.len(), 1);
        assert_eq!(channel.sent_messages().await[0].text, "partial and final");
    }
}
