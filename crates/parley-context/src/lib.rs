// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly for Parley.
//!
//! Builds a [`ProviderRequest`] from the persona's system prompt, the part of
//! the dialog history that fits the model's context window, and the new
//! user message.

pub mod estimate;
pub mod persona;
pub mod trimmer;

use parley_config::model::OpenAiConfig;
use parley_core::types::{ChatMessage, PersonaId, ProviderRequest, Role, Turn};
use tracing::debug;

pub use estimate::estimate_tokens;
pub use persona::{Persona, catalog, persona};
pub use trimmer::{ContextTrimmer, TrimOutcome};

/// A request ready for the provider plus the trimming result.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub request: ProviderRequest,
    /// The history that went into the request, oldest first.
    pub retained: Vec<Turn>,
    pub turns_dropped: usize,
}

/// Assembles provider requests within the configured context window.
#[derive(Debug, Clone)]
pub struct ContextEngine {
    trimmer: ContextTrimmer,
    max_tokens: u32,
    temperature: f32,
}

impl ContextEngine {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            trimmer: ContextTrimmer::new(config.context_window, config.max_tokens as usize),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// System prompt, trimmed history, then the new message.
    pub fn assemble(&self, persona_id: PersonaId, turns: &[Turn], message: &str) -> AssembledContext {
        let persona = persona::persona(persona_id);
        let outcome = self.trimmer.trim(turns, persona.system_prompt, message);

        let mut messages = Vec::with_capacity(outcome.retained.len() * 2 + 2);
        messages.push(ChatMessage::new(Role::System, persona.system_prompt));
        for turn in &outcome.retained {
            messages.push(ChatMessage::new(Role::User, turn.user_text.clone()));
            messages.push(ChatMessage::new(Role::Assistant, turn.assistant_text.clone()));
        }
        messages.push(ChatMessage::new(Role::User, message));

        debug!(
            persona = %persona_id,
            history = turns.len(),
            dropped = outcome.dropped,
            "context assembled"
        );

        AssembledContext {
            request: ProviderRequest {
                messages,
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
            },
            retained: outcome.retained,
            turns_dropped: outcome.dropped,
        }
    }

    /// A one-shot request with no history (speech side-flow).
    pub fn single(&self, persona_id: PersonaId, message: &str) -> ProviderRequest {
        self.assemble(persona_id, &[], message).request
    }
}
