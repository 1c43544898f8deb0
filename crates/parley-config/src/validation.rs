// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Telegram refuses messages longer than this.
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Validates a deserialized configuration, collecting every problem found.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::invalid(format!(
            "agent.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.agent.log_level
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path must not be empty"));
    }

    if config.openai.context_window == 0 {
        errors.push(ConfigError::invalid("openai.context_window must be positive"));
    }

    if config.dialog.stream_edit_delta_chars == 0 {
        errors.push(ConfigError::invalid(
            "dialog.stream_edit_delta_chars must be positive",
        ));
    }

    let max_chars = config.dialog.max_message_chars;
    if max_chars == 0 || max_chars > TELEGRAM_MESSAGE_LIMIT {
        errors.push(ConfigError::invalid(format!(
            "dialog.max_message_chars must be between 1 and {TELEGRAM_MESSAGE_LIMIT}, got {max_chars}"
        )));
    }

    if let Err(e) = config.billing.refill_schedule.parse::<croner::Cron>() {
        errors.push(ConfigError::invalid(format!(
            "billing.refill_schedule `{}` is not a valid cron expression: {e}",
            config.billing.refill_schedule
        )));
    }

    for (key, value) in [
        ("billing.initial_balance", config.billing.initial_balance),
        ("billing.refill_floor", config.billing.refill_floor),
        ("billing.image_cost_tokens", config.billing.image_cost_tokens),
    ] {
        if value < 0 {
            errors.push(ConfigError::invalid(format!(
                "{key} must be non-negative, got {value}"
            )));
        }
    }

    if config.billing.chat_price_per_1000_tokens <= 0.0 {
        errors.push(ConfigError::invalid(
            "billing.chat_price_per_1000_tokens must be positive",
        ));
    }

    if config.billing.fallback_usd_rate <= 0.0 {
        errors.push(ConfigError::invalid("billing.fallback_usd_rate must be positive"));
    }

    if config.billing.package.tokens <= 0 {
        errors.push(ConfigError::invalid("billing.package.tokens must be positive"));
    }

    if config.billing.package.price_minor <= 0 {
        errors.push(ConfigError::invalid(
            "billing.package.price_minor must be positive",
        ));
    }

    for (key, prefix) in [
        ("triggers.image_prefix", &config.triggers.image_prefix),
        ("triggers.speak_prefix", &config.triggers.speak_prefix),
    ] {
        if prefix.trim().is_empty() {
            errors.push(ConfigError::invalid(format!("{key} must not be empty")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ParleyConfig::default();
        config.agent.log_level = "loud".into();
        config.openai.context_window = 0;
        config.billing.refill_schedule = "every day".into();
        config.dialog.max_message_chars = 10_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn negative_balances_are_rejected() {
        let mut config = ParleyConfig::default();
        config.billing.initial_balance = -1;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("billing.initial_balance"));
    }
}
