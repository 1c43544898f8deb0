// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch and streaming generation converge on one event shape.
//!
//! Both modes end with exactly one [`GenerationEvent::Finished`] carrying the
//! answer, the tokens used and the number of dropped turns. Streaming mode
//! yields [`GenerationEvent::Partial`] with the accumulated answer before it.

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use parley_context::estimate::{estimate_tokens, message_cost};
use parley_core::traits::ChunkStream;
use parley_core::types::{
    GenerationEvent, GenerationOutcome, ProviderRequest, TokenUsage,
};
use parley_core::{ParleyError, ProviderAdapter};
use tracing::debug;

pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<GenerationEvent, ParleyError>> + Send>>;

/// Provider usage when reported, else the local estimate.
fn tokens_used(usage: Option<TokenUsage>, prompt_estimate: u64, answer: &str) -> u64 {
    match usage {
        Some(usage) => usage.total(),
        None => {
            let estimate = prompt_estimate + estimate_tokens(answer) as u64;
            debug!(estimate, "provider reported no usage, using estimate");
            estimate
        }
    }
}

fn prompt_estimate(request: &ProviderRequest) -> u64 {
    request
        .messages
        .iter()
        .map(|m| message_cost(&m.content) as u64)
        .sum()
}

/// Runs generations against one provider in the configured mode.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn ProviderAdapter>,
    streaming: bool,
}

struct StreamState {
    chunks: ChunkStream,
    answer: String,
    usage: Option<TokenUsage>,
    prompt_estimate: u64,
    turns_dropped: usize,
    done: bool,
}

impl Generator {
    pub fn new(provider: Arc<dyn ProviderAdapter>, streaming: bool) -> Self {
        Self {
            provider,
            streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// One blocking completion, for flows that never stream.
    pub async fn complete(
        &self,
        request: ProviderRequest,
        turns_dropped: usize,
    ) -> Result<GenerationOutcome, ParleyError> {
        let estimate = prompt_estimate(&request);
        let response = self.provider.complete(request).await?;
        let tokens_used = tokens_used(response.usage, estimate, &response.content);
        Ok(GenerationOutcome {
            answer: response.content,
            tokens_used,
            turns_dropped,
        })
    }

    /// Starts a generation. Errors from the provider surface either here or
    /// as an `Err` item in the stream; in both cases nothing was finished.
    pub async fn start(
        &self,
        request: ProviderRequest,
        turns_dropped: usize,
    ) -> Result<GenerationStream, ParleyError> {
        if !self.streaming {
            let outcome = self.complete(request, turns_dropped).await?;
            return Ok(Box::pin(stream::once(async move {
                Ok(GenerationEvent::Finished(outcome))
            })));
        }

        let state = StreamState {
            prompt_estimate: prompt_estimate(&request),
            chunks: self.provider.stream(request).await?,
            answer: String::new(),
            usage: None,
            turns_dropped,
            done: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            loop {
                match st.chunks.next().await {
                    Some(Ok(chunk)) => {
                        if chunk.usage.is_some() {
                            st.usage = chunk.usage;
                        }
                        if let Some(delta) = chunk.delta.filter(|d| !d.is_empty()) {
                            st.answer.push_str(&delta);
                            let partial = GenerationEvent::Partial(st.answer.clone());
                            return Some((Ok(partial), st));
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                    None => {
                        st.done = true;
                        let outcome = GenerationOutcome {
                            tokens_used: tokens_used(st.usage, st.prompt_estimate, &st.answer),
                            answer: std::mem::take(&mut st.answer),
                            turns_dropped: st.turns_dropped,
                        };
                        return Some((Ok(GenerationEvent::Finished(outcome)), st));
                    }
                }
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{ChatMessage, ProviderStreamChunk, Role};
    use parley_test_utils::MockProvider;

    fn request() -> ProviderRequest {
        ProviderRequest {
            messages: vec![ChatMessage::new(Role::User, "hello")],
            max_tokens: Some(100),
            temperature: None,
        }
    }

    async fn collect(stream: GenerationStream) -> Vec<Result<GenerationEvent, ParleyError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn batch_mode_yields_a_single_finished_event() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response("hi there", Some(42)).await;
        let generator = Generator::new(provider, false);

        let events = collect(generator.start(request(), 2).await.unwrap()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GenerationEvent::Finished(GenerationOutcome {
                answer: "hi there".into(),
                tokens_used: 42,
                turns_dropped: 2,
            })
        );
    }

    #[tokio::test]
    async fn streaming_accumulates_and_skips_empty_chunks() {
        let provider = Arc::new(MockProvider::new());
        provider.add_chunks(vec![
            ProviderStreamChunk { delta: Some(String::new()), ..Default::default() },
            ProviderStreamChunk { delta: Some("hi".into()), ..Default::default() },
            ProviderStreamChunk { delta: Some(" there".into()), ..Default::default() },
            ProviderStreamChunk {
                usage: Some(TokenUsage { prompt_tokens: 30, completion_tokens: 12 }),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
        ])
        .await;
        let generator = Generator::new(provider, true);

        let events: Vec<GenerationEvent> = collect(generator.start(request(), 0).await.unwrap())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            events,
            vec![
                GenerationEvent::Partial("hi".into()),
                GenerationEvent::Partial("hi there".into()),
                GenerationEvent::Finished(GenerationOutcome {
                    answer: "hi there".into(),
                    tokens_used: 42,
                    turns_dropped: 0,
                }),
            ]
        );
    }

    #[tokio::test]
    async fn missing_usage_falls_back_to_estimate() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response("abcdefgh", None).await;
        let generator = Generator::new(provider, false);

        let outcome = generator.complete(request(), 0).await.unwrap();
        // "hello" costs 2 + 4 overhead; "abcdefgh" is 2.
        assert_eq!(outcome.tokens_used, 8);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_error() {
        let provider = Arc::new(MockProvider::new());
        provider.add_failure("upstream 500").await;
        let generator = Generator::new(provider, false);
        assert!(matches!(
            generator.start(request(), 0).await,
            Err(ParleyError::GenerationFailed { .. })
        ));
    }
}
