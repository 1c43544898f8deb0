// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Character-based token estimate.
//!
//! Not a tokenizer. Latin text averages about four characters per token,
//! while Cyrillic text is close to one token per character, so the two are
//! counted separately.

use parley_core::types::Turn;

/// Fixed overhead per chat message (role and separators).
pub const MESSAGE_OVERHEAD: usize = 4;

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}' | '\u{0500}'..='\u{052F}')
}

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    let (cyrillic, other) = text.chars().fold((0usize, 0usize), |(cyr, oth), c| {
        match is_cyrillic(c) {
            true => (cyr + 1, oth),
            false => (cyr, oth + 1),
        }
    });
    cyrillic + other.div_ceil(4)
}

/// Estimated cost of one message, overhead included.
pub fn message_cost(text: &str) -> usize {
    estimate_tokens(text) + MESSAGE_OVERHEAD
}

/// Estimated cost of a turn: its user and assistant messages.
pub fn turn_cost(turn: &Turn) -> usize {
    message_cost(&turn.user_text) + message_cost(&turn.assistant_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_is_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn cyrillic_counts_one_per_char() {
        assert_eq!(estimate_tokens("привет"), 6);
        // 6 Cyrillic letters plus ", hi" (4 other chars).
        assert_eq!(estimate_tokens("привет, hi"), 7);
    }

    #[test]
    fn turn_cost_includes_both_messages() {
        let turn = Turn::new("abcd", "abcdabcd");
        assert_eq!(turn_cost(&turn), 1 + 2 + 2 * MESSAGE_OVERHEAD);
    }
}
