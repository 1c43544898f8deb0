// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use parley_config::diagnostic::ConfigError;
use parley_config::model::ParleyConfig;
use parley_config::{load_and_validate_str, load_config_from_str};
use parley_core::types::PersonaId;

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "maks"
log_level = "debug"

[telegram]
bot_token = "123:ABC"
allowed_users = ["alice", "42"]
group_trigger = "Bot, "
payment_provider_token = "pay:XYZ"

[openai]
api_key = "sk-test"
chat_model = "gpt-4o-mini"
context_window = 16000

[storage]
database_path = "/tmp/parley-test.db"
wal_mode = false

[dialog]
new_dialog_timeout_secs = 300
streaming = false
default_persona = "code_assistant"

[billing]
initial_balance = 500
admin_ids = [1, 2]
refill_schedule = "0 0 * * *"

[billing.package]
tokens = 50000
price_minor = 19900
currency = "USD"

[triggers]
image_prefix = "Draw"
speak_prefix = "Say"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "maks");
    assert_eq!(config.telegram.allowed_users, vec!["alice", "42"]);
    assert_eq!(config.telegram.group_trigger, "Bot, ");
    assert_eq!(config.openai.context_window, 16000);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.dialog.new_dialog_timeout_secs, 300);
    assert!(!config.dialog.streaming);
    assert_eq!(config.dialog.default_persona, PersonaId::CodeAssistant);
    assert_eq!(config.billing.initial_balance, 500);
    assert_eq!(config.billing.admin_ids, vec![1, 2]);
    assert_eq!(config.billing.package.tokens, 50000);
    assert_eq!(config.billing.package.currency, "USD");
    // Unset package keys keep their defaults.
    assert_eq!(config.billing.package.payload, "parley-token-package");
    assert_eq!(config.triggers.image_prefix, "Draw");
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config, ParleyConfig::default());
}

#[test]
fn unknown_key_is_reported_with_suggestion() {
    let toml = r#"
[telegram]
bot_tken = "abc"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "bot_tken");
            assert_eq!(suggestion.as_deref(), Some("bot_token"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[vault]\nkey = 1\n").expect_err("no such section");
    assert!(matches!(errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[dialog]\nstreaming = \"yes\"\n").expect_err("bad type");
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert!(key.contains("streaming")),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn unknown_persona_is_rejected() {
    let result = load_and_validate_str("[dialog]\ndefault_persona = \"pirate\"\n");
    assert!(result.is_err());
}

#[test]
fn validation_runs_after_parsing() {
    let errors = load_and_validate_str("[billing.package]\ntokens = 0\n")
        .expect_err("zero-token package is invalid");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
fn diagnostics_render_without_panicking() {
    let errors = load_and_validate_str("[agent]\nnaem = \"x\"\n").unwrap_err();
    parley_config::render_errors(&errors);
}
