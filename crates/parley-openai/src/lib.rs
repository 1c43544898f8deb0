// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI provider adapter for the Parley bot.
//!
//! Implements [`ProviderAdapter`] over the OpenAI HTTP API: chat completions
//! (batch and SSE streaming), image generation, Whisper transcription, and
//! speech synthesis.

pub mod client;
pub mod sse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use parley_config::model::OpenAiConfig;
use parley_core::error::ParleyError;
use parley_core::traits::{ChunkStream, PluginAdapter, ProviderAdapter};
use parley_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk, TokenUsage,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ApiMessage, ApiUsage, ChatChunk, ChatRequest, ImageRequest, SpeechRequest};

/// Provider adapter for OpenAI models.
pub struct OpenAiProvider {
    client: OpenAiClient,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;

        info!(model = config.chat_model, "OpenAI provider initialized");

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn to_chat_request(&self, request: &ProviderRequest) -> ChatRequest {
        ChatRequest {
            model: self.config.chat_model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            stream_options: None,
        }
    }
}

fn to_usage(usage: ApiUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    }
}

fn to_stream_chunk(chunk: ChatChunk) -> ProviderStreamChunk {
    let (delta, finish_reason) = match chunk.choices.into_iter().next() {
        Some(choice) => (choice.delta.content, choice.finish_reason),
        None => (None, None),
    };
    ProviderStreamChunk {
        delta,
        usage: chunk.usage.map(to_usage),
        finish_reason,
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // No API call: a health probe should not spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let response = self
            .client
            .chat_completion(&self.to_chat_request(&request))
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::generation("completion contained no choices"))?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: response.usage.map(to_usage),
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ParleyError> {
        let chunks = self
            .client
            .chat_stream(&self.to_chat_request(&request))
            .await?;
        Ok(Box::pin(chunks.map(|chunk| chunk.map(to_stream_chunk))))
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ParleyError> {
        self.client
            .create_image(&ImageRequest {
                model: self.config.image_model.clone(),
                prompt: prompt.to_string(),
                n: 1,
                size: self.config.image_size.clone(),
            })
            .await
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ParleyError> {
        self.client
            .transcribe(&self.config.transcription_model, audio, file_name)
            .await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ParleyError> {
        self.client
            .speech(&SpeechRequest {
                model: self.config.speech_model.clone(),
                input: text.to_string(),
                voice: self.config.speech_voice.clone(),
                response_format: "opus".into(),
            })
            .await
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, ParleyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("OPENAI_API_KEY").map_err(|_| {
        ParleyError::Config(
            "OpenAI API key not found. Set openai.api_key in config or OPENAI_API_KEY environment variable.".into(),
        )
    })
}
