// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for streaming chat completions.
//!
//! Every event carries a JSON [`ChatChunk`] in its data field; the stream
//! ends with a literal `[DONE]` sentinel, which is dropped here.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use parley_core::ParleyError;

use crate::types::{ApiErrorResponse, ChatChunk};

const DONE: &str = "[DONE]";

/// Parses a streaming response into typed chunks.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, ParleyError>> + Send>> {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => parse_event_data(&event.data),
            Err(e) => Some(Err(ParleyError::GenerationFailed {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}

/// Decodes one event payload. `None` for the end sentinel and keep-alives.
pub(crate) fn parse_event_data(data: &str) -> Option<Result<ChatChunk, ParleyError>> {
    let data = data.trim();
    if data.is_empty() || data == DONE {
        return None;
    }
    if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(data) {
        return Some(Err(ParleyError::generation(format!(
            "OpenAI stream error: {}",
            api_err.error.message
        ))));
    }
    Some(
        serde_json::from_str::<ChatChunk>(data).map_err(|e| ParleyError::GenerationFailed {
            message: format!("failed to parse stream chunk: {e}"),
            source: Some(Box::new(e)),
        }),
    )
}
