// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI API.
//!
//! Provides [`OpenAiClient`] which handles authentication, request
//! construction, streaming SSE responses, and transient error retry.

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use parley_core::ParleyError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::sse;
use crate::types::{
    ApiErrorResponse, ChatChunk, ChatRequest, ChatResponse, ImageRequest, ImageResponse,
    SpeechRequest, StreamOptions, TranscriptionResponse,
};

/// HTTP client for OpenAI API communication.
///
/// Transient failures (429, 500, 502, 503) are retried once after one second.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

fn provider_error(message: String, source: Option<reqwest::Error>) -> ParleyError {
    ParleyError::GenerationFailed {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| provider_error(format!("failed to build HTTP client: {e}"), Some(e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    /// Sends the request built by `build`, retrying transient failures.
    ///
    /// `build` runs once per attempt, so bodies that cannot be cloned
    /// (multipart uploads) are rebuilt for the retry.
    async fn execute<F>(&self, what: &str, build: F) -> Result<reqwest::Response, ParleyError>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, ParleyError>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, what, "retrying request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = build(&self.client)?
                .send()
                .await
                .map_err(|e| provider_error(format!("HTTP request failed: {e}"), Some(e)))?;

            let status = response.status();
            debug!(status = %status, attempt, what, "response received");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(provider_error(format!("API returned {status}: {body}"), None));
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "OpenAI API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(provider_error(message, None));
        }

        Err(last_error
            .unwrap_or_else(|| provider_error(format!("{what} request failed after retries"), None)))
    }

    async fn json_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ParleyError> {
        let body = response
            .text()
            .await
            .map_err(|e| provider_error(format!("failed to read response body: {e}"), Some(e)))?;
        serde_json::from_str(&body).map_err(|e| ParleyError::GenerationFailed {
            message: format!("failed to parse API response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Non-streaming chat completion.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ParleyError> {
        let mut req = request.clone();
        req.stream = false;
        req.stream_options = None;

        let url = self.url("chat/completions");
        let response = self
            .execute("chat", |client| Ok(client.post(&url).json(&req)))
            .await?;
        Self::json_body(response).await
    }

    /// Streaming chat completion. The final chunk carries token usage.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<ChatChunk, ParleyError>> + Send>>, ParleyError>
    {
        let mut req = request.clone();
        req.stream = true;
        req.stream_options = Some(StreamOptions {
            include_usage: true,
        });

        let url = self.url("chat/completions");
        let response = self
            .execute("chat stream", |client| Ok(client.post(&url).json(&req)))
            .await?;
        Ok(sse::parse_sse_stream(response))
    }

    /// Generates one image and returns its URL.
    pub async fn create_image(&self, request: &ImageRequest) -> Result<String, ParleyError> {
        let url = self.url("images/generations");
        let response = self
            .execute("image", |client| Ok(client.post(&url).json(request)))
            .await?;
        let images: ImageResponse = Self::json_body(response).await?;
        images
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| ParleyError::generation("image response contained no URL"))
    }

    /// Transcribes an audio clip.
    pub async fn transcribe(
        &self,
        model: &str,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ParleyError> {
        let url = self.url("audio/transcriptions");
        let response = self
            .execute("transcription", |client| {
                let part = reqwest::multipart::Part::bytes(audio.clone())
                    .file_name(file_name.to_string())
                    .mime_str("audio/ogg")
                    .map_err(|e| provider_error(format!("invalid audio mime type: {e}"), Some(e)))?;
                let form = reqwest::multipart::Form::new()
                    .text("model", model.to_string())
                    .part("file", part);
                Ok(client.post(&url).multipart(form))
            })
            .await?;
        let transcription: TranscriptionResponse = Self::json_body(response).await?;
        Ok(transcription.text)
    }

    /// Synthesizes speech; returns the encoded audio.
    pub async fn speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, ParleyError> {
        let url = self.url("audio/speech");
        let response = self
            .execute("speech", |client| Ok(client.post(&url).json(request)))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| provider_error(format!("failed to read audio body: {e}"), Some(e)))?;
        Ok(bytes.to_vec())
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}
