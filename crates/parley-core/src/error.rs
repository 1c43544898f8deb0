// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley bot.

use thiserror::Error;

/// The primary error type used across all Parley adapters and the metering core.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// No account exists for an operation that expects one.
    #[error("user not found: {user}")]
    UserNotFound { user: i64 },

    /// The user has no spendable balance left.
    #[error("balance exhausted")]
    BalanceExhausted,

    /// A previous request from the same user is still in flight.
    #[error("a previous request is still being processed")]
    AlreadyProcessing,

    /// The generation provider failed (network, rate limit, malformed response).
    #[error("generation failed: {message}")]
    GenerationFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The messaging transport refused a payload (bad markup, unchanged edit, too long).
    #[error("transport rejected message: {message}")]
    TransportRejected {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (invalid values, missing credentials).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors other than payload rejection.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal invariant violations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Expected rejections that are answered with a notice rather than logged as failures.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::BalanceExhausted | Self::AlreadyProcessing)
    }

    /// Shorthand for a provider failure without an underlying source.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_errors_are_classified() {
        assert!(ParleyError::BalanceExhausted.is_user_facing());
        assert!(ParleyError::AlreadyProcessing.is_user_facing());
        assert!(!ParleyError::UserNotFound { user: 7 }.is_user_facing());
        assert!(!ParleyError::generation("boom").is_user_facing());
    }

    #[test]
    fn generation_error_displays_detail() {
        let err = ParleyError::generation("upstream returned 502");
        assert_eq!(err.to_string(), "generation failed: upstream returned 502");
    }
}
