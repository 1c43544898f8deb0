// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation provider trait for LLM, image, and speech APIs.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse, ProviderStreamChunk};

/// Stream of completion increments.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, ParleyError>> + Send>>;

/// Adapter for the generation APIs the bot depends on.
///
/// Every failure is reported as [`ParleyError::GenerationFailed`].
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError>;

    /// Sends a completion request and returns a stream of response chunks.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ParleyError>;

    /// Generates an image and returns a URL to it.
    async fn generate_image(&self, prompt: &str) -> Result<String, ParleyError>;

    /// Transcribes an audio clip to text.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ParleyError>;

    /// Synthesizes speech for `text`, returning an OGG/Opus clip.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ParleyError>;
}
