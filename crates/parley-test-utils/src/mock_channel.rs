// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound events
//! and captures everything the core sends back for assertion in tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use parley_core::types::{
    AdapterType, ChannelCapabilities, ChatId, HealthStatus, InboundMessage, Invoice, MessageId,
    OutboundMessage, OutputFormat, Presence,
};
use parley_core::{ChannelAdapter, ParleyError, PluginAdapter};

/// An edit of a previously sent message.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEdit {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub format: OutputFormat,
}

/// A photo sent by URL.
#[derive(Debug, Clone, PartialEq)]
pub struct SentPhoto {
    pub chat_id: ChatId,
    pub url: String,
    pub caption: Option<String>,
}

/// A voice note or document attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFile {
    pub chat_id: ChatId,
    pub file_name: String,
    pub data: Vec<u8>,
    pub caption: Option<String>,
}

#[derive(Default)]
struct Captured {
    sent: Vec<OutboundMessage>,
    edits: Vec<SentEdit>,
    presences: Vec<(ChatId, Presence)>,
    photos: Vec<SentPhoto>,
    voices: Vec<SentFile>,
    documents: Vec<SentFile>,
    invoices: Vec<Invoice>,
}

/// A mock messaging channel for testing.
///
/// - **inbound**: events injected via `inject_message()` are returned by `receive()`
/// - **outbound**: sends, edits, attachments and invoices are captured
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
    captured: Arc<Mutex<Captured>>,
    notify: Arc<Notify>,
    closed: AtomicBool,
    next_id: AtomicU64,
    failing_chats: Mutex<HashSet<ChatId>>,
    capabilities: ChannelCapabilities,
}

impl MockChannel {
    /// A channel that supports edits, presence and payments.
    pub fn new() -> Self {
        Self::with_capabilities(ChannelCapabilities {
            supports_edit: true,
            supports_presence: true,
            supports_payments: true,
            max_message_length: Some(4096),
        })
    }

    /// A channel that can only send new messages.
    pub fn without_edit() -> Self {
        Self::with_capabilities(ChannelCapabilities {
            supports_edit: false,
            supports_presence: false,
            supports_payments: false,
            max_message_length: None,
        })
    }

    pub fn with_capabilities(capabilities: ChannelCapabilities) -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            captured: Arc::new(Mutex::new(Captured::default())),
            notify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            failing_chats: Mutex::new(HashSet::new()),
            capabilities,
        }
    }

    /// Inject an inbound event. The next `receive()` returns it.
    pub async fn inject_message(&self, msg: InboundMessage) {
        self.inbound.lock().await.push_back(msg);
        self.notify.notify_one();
    }

    /// After the queue drains, `receive()` reports the channel as closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Every send to `chat` fails from now on.
    pub async fn fail_chat(&self, chat: ChatId) {
        self.failing_chats.lock().await.insert(chat);
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.captured.lock().await.sent.clone()
    }

    /// Texts of all sent messages, in order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.captured
            .lock()
            .await
            .sent
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.captured.lock().await.sent.len()
    }

    pub async fn edits(&self) -> Vec<SentEdit> {
        self.captured.lock().await.edits.clone()
    }

    pub async fn presences(&self) -> Vec<(ChatId, Presence)> {
        self.captured.lock().await.presences.clone()
    }

    pub async fn photos(&self) -> Vec<SentPhoto> {
        self.captured.lock().await.photos.clone()
    }

    pub async fn voices(&self) -> Vec<SentFile> {
        self.captured.lock().await.voices.clone()
    }

    pub async fn documents(&self) -> Vec<SentFile> {
        self.captured.lock().await.documents.clone()
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.captured.lock().await.invoices.clone()
    }

    /// Clear everything captured so far.
    pub async fn clear_sent(&self) {
        *self.captured.lock().await = Captured::default();
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(format!(
            "mock-msg-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }

    async fn check_chat(&self, chat: ChatId) -> Result<(), ParleyError> {
        if self.failing_chats.lock().await.contains(&chat) {
            return Err(ParleyError::Channel {
                message: format!("chat {chat} is unreachable"),
                source: None,
            });
        }
        Ok(())
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.close();
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        self.capabilities.clone()
    }

    async fn connect(&mut self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, ParleyError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(msg) = queue.pop_front() {
                    return Ok(msg);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(ParleyError::Channel {
                    message: "mock channel closed".into(),
                    source: None,
                });
            }
            self.notify.notified().await;
        }
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ParleyError> {
        self.check_chat(msg.chat_id).await?;
        self.captured.lock().await.sent.push(msg);
        Ok(self.next_message_id())
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: &MessageId,
        text: &str,
        format: OutputFormat,
    ) -> Result<(), ParleyError> {
        self.check_chat(chat_id).await?;
        self.captured.lock().await.edits.push(SentEdit {
            chat_id,
            message_id: message_id.clone(),
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn send_presence(&self, chat_id: ChatId, presence: Presence) -> Result<(), ParleyError> {
        self.captured.lock().await.presences.push((chat_id, presence));
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError> {
        self.check_chat(chat_id).await?;
        self.captured.lock().await.photos.push(SentPhoto {
            chat_id,
            url: url.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(self.next_message_id())
    }

    async fn send_voice(
        &self,
        chat_id: ChatId,
        audio: Vec<u8>,
        _reply_to: Option<&MessageId>,
    ) -> Result<MessageId, ParleyError> {
        self.check_chat(chat_id).await?;
        self.captured.lock().await.voices.push(SentFile {
            chat_id,
            file_name: "voice.ogg".into(),
            data: audio,
            caption: None,
        });
        Ok(self.next_message_id())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MessageId, ParleyError> {
        self.check_chat(chat_id).await?;
        self.captured.lock().await.documents.push(SentFile {
            chat_id,
            file_name: file_name.to_string(),
            data,
            caption: caption.map(str::to_string),
        });
        Ok(self.next_message_id())
    }

    async fn send_invoice(&self, invoice: Invoice) -> Result<MessageId, ParleyError> {
        self.check_chat(invoice.chat_id).await?;
        self.captured.lock().await.invoices.push(invoice);
        Ok(self.next_message_id())
    }
}
