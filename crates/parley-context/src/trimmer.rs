// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context window trimming.
//!
//! Keeps the longest suffix of the history that fits the budget. A history
//! is never cut inside a turn, and the newest turn is always kept, even when
//! it alone exceeds the budget.

use parley_core::types::Turn;

use crate::estimate::{message_cost, turn_cost};

/// The retained suffix and how many leading turns were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    pub retained: Vec<Turn>,
    pub dropped: usize,
}

/// Number of trailing items to keep so their summed cost stays within `budget`.
///
/// Returns at least 1 for a non-empty slice.
pub fn suffix_len(costs: &[usize], budget: usize) -> usize {
    let mut total = 0usize;
    let mut kept = 0usize;
    for cost in costs.iter().rev() {
        total = total.saturating_add(*cost);
        if total > budget {
            break;
        }
        kept += 1;
    }
    match costs.is_empty() {
        true => 0,
        false => kept.max(1),
    }
}

/// Fits dialog history into a model's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextTrimmer {
    context_window: usize,
    reply_reserve: usize,
}

impl ContextTrimmer {
    /// `reply_reserve` is held back for the completion itself.
    pub fn new(context_window: usize, reply_reserve: usize) -> Self {
        Self {
            context_window,
            reply_reserve,
        }
    }

    /// Tokens left for history once the prompt and the new message are placed.
    pub fn history_budget(&self, system_prompt: &str, new_message: &str) -> usize {
        self.context_window
            .saturating_sub(self.reply_reserve)
            .saturating_sub(message_cost(system_prompt))
            .saturating_sub(message_cost(new_message))
    }

    pub fn trim(&self, turns: &[Turn], system_prompt: &str, new_message: &str) -> TrimOutcome {
        let costs: Vec<usize> = turns.iter().map(turn_cost).collect();
        let kept = suffix_len(&costs, self.history_budget(system_prompt, new_message));
        let dropped = turns.len() - kept;
        TrimOutcome {
            retained: turns[dropped..].to_vec(),
            dropped,
        }
    }
}
