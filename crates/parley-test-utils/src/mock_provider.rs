// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation provider for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with queued replies, failure
//! injection and a hold switch that parks calls mid-generation, so tests can
//! observe a request while it is in flight.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{Mutex, Notify, watch};

use parley_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk, TokenUsage,
};
use parley_core::{ChunkStream, ParleyError, PluginAdapter, ProviderAdapter};

/// Tokens reported for the default reply.
pub const DEFAULT_TOKENS: u64 = 30;

/// One queued chat reply.
#[derive(Debug, Clone)]
enum MockReply {
    Text { content: String, tokens: Option<u64> },
    Chunks(Vec<ProviderStreamChunk>),
    Failure(String),
}

impl MockReply {
    /// The reply as a stream: an empty first chunk, the text in two halves,
    /// then a final chunk with usage.
    fn into_chunks(self) -> Result<Vec<ProviderStreamChunk>, ParleyError> {
        match self {
            MockReply::Text { content, tokens } => {
                let mid = content
                    .char_indices()
                    .nth(content.chars().count() / 2)
                    .map_or(content.len(), |(idx, _)| idx);
                let (head, tail) = content.split_at(mid);
                Ok(vec![
                    ProviderStreamChunk {
                        delta: Some(String::new()),
                        ..Default::default()
                    },
                    ProviderStreamChunk {
                        delta: Some(head.to_string()),
                        ..Default::default()
                    },
                    ProviderStreamChunk {
                        delta: Some(tail.to_string()),
                        ..Default::default()
                    },
                    ProviderStreamChunk {
                        delta: None,
                        usage: tokens.map(usage),
                        finish_reason: Some("stop".into()),
                    },
                ])
            }
            MockReply::Chunks(chunks) => Ok(chunks),
            MockReply::Failure(message) => Err(ParleyError::generation(message)),
        }
    }

    fn into_response(self) -> Result<ProviderResponse, ParleyError> {
        match self {
            MockReply::Text { content, tokens } => Ok(ProviderResponse {
                content,
                usage: tokens.map(usage),
                finish_reason: Some("stop".into()),
            }),
            MockReply::Chunks(chunks) => Ok(ProviderResponse {
                content: chunks.iter().filter_map(|c| c.delta.as_deref()).collect(),
                usage: chunks.iter().filter_map(|c| c.usage).last(),
                finish_reason: chunks.iter().filter_map(|c| c.finish_reason.clone()).last(),
            }),
            MockReply::Failure(message) => Err(ParleyError::generation(message)),
        }
    }
}

fn usage(total: u64) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total,
        completion_tokens: 0,
    }
}

/// A mock provider that returns queued replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty, a default
/// "mock response" costing [`DEFAULT_TOKENS`] is returned.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    images: Mutex<VecDeque<Result<String, String>>>,
    transcriptions: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
    started: Notify,
    hold: watch::Sender<bool>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            images: Mutex::new(VecDeque::new()),
            transcriptions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            hold: watch::Sender::new(false),
        }
    }

    /// A provider pre-loaded with replies costing [`DEFAULT_TOKENS`] each.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let replies = responses
            .into_iter()
            .map(|content| MockReply::Text {
                content,
                tokens: Some(DEFAULT_TOKENS),
            })
            .collect();
        Self {
            replies: Arc::new(Mutex::new(replies)),
            ..Self::new()
        }
    }

    /// Queue a reply. `tokens: None` omits usage from the response.
    pub async fn add_response(&self, content: impl Into<String>, tokens: Option<u64>) {
        self.replies.lock().await.push_back(MockReply::Text {
            content: content.into(),
            tokens,
        });
    }

    /// Queue an exact chunk sequence for the next stream.
    pub async fn add_chunks(&self, chunks: Vec<ProviderStreamChunk>) {
        self.replies.lock().await.push_back(MockReply::Chunks(chunks));
    }

    /// Make the next chat call fail.
    pub async fn add_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(MockReply::Failure(message.into()));
    }

    pub async fn add_image(&self, result: Result<String, String>) {
        self.images.lock().await.push_back(result);
    }

    pub async fn add_transcription(&self, result: Result<String, String>) {
        self.transcriptions.lock().await.push_back(result);
    }

    /// Park every chat call after it starts, until [`release`](Self::release).
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Resolves once a chat call has started (including calls that started
    /// before this was awaited).
    pub async fn wait_for_call(&self) {
        self.started.notified().await;
    }

    /// Number of chat calls (batch and stream) so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every chat request received, in order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self, request: ProviderRequest) -> MockReply {
        self.requests.lock().await.push(request);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|on_hold| !*on_hold).await;

        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::Text {
                content: "mock response".into(),
                tokens: Some(DEFAULT_TOKENS),
            })
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        self.next_reply(request).await.into_response()
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ParleyError> {
        let chunks = self.next_reply(request).await.into_chunks()?;
        Ok(Box::pin(stream::iter(
            chunks.into_iter().map(Ok::<_, ParleyError>),
        )))
    }

    async fn generate_image(&self, _prompt: &str) -> Result<String, ParleyError> {
        self.images
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("https://images.example.com/mock.png".into()))
            .map_err(ParleyError::generation)
    }

    async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String, ParleyError> {
        self.transcriptions
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("mock transcription".into()))
            .map_err(ParleyError::generation)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ParleyError> {
        Ok(text.as_bytes().to_vec())
    }
}
