// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key is a
//! startup error with a suggestion instead of a silently ignored setting.

use parley_core::types::PersonaId;
use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Bot identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Telegram bot integration.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// OpenAI API settings for chat, images, transcription, and speech.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// SQLite storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dialog lifetime and streaming delivery.
    #[serde(default)]
    pub dialog: DialogConfig,

    /// Balances, prices, refills, and the top-up package.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Message prefixes that switch a text into a side-flow.
    #[serde(default)]
    pub triggers: TriggerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in greetings and logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram bot integration configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required by `serve`.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// User ids or usernames allowed to talk to the bot. Empty admits everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Prefix a group message must start with to be answered.
    #[serde(default = "default_group_trigger")]
    pub group_trigger: String,

    /// Payment provider token for invoices. `None` disables `/buy`.
    #[serde(default)]
    pub payment_provider_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: Vec::new(),
            group_trigger: default_group_trigger(),
            payment_provider_token: None,
        }
    }
}

fn default_group_trigger() -> String {
    "Макс, ".to_string()
}

/// OpenAI API configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Completion length limit per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Model context size; the dialog history is trimmed to fit it.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_image_size")]
    pub image_size: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    #[serde(default = "default_speech_voice")]
    pub speech_voice: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
            temperature: default_temperature(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            transcription_model: default_transcription_model(),
            speech_model: default_speech_model(),
            speech_voice: default_speech_voice(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_context_window() -> usize {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_image_model() -> String {
    "dall-e-2".to_string()
}

fn default_image_size() -> String {
    "512x512".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_speech_voice() -> String {
    "alloy".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Dialog lifetime and delivery configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DialogConfig {
    /// Inactivity after which the next message silently starts a new dialog.
    #[serde(default = "default_new_dialog_timeout_secs")]
    pub new_dialog_timeout_secs: u64,

    /// Deliver answers incrementally by editing the reply in place.
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Minimum growth in characters between two streaming edits.
    #[serde(default = "default_stream_edit_delta_chars")]
    pub stream_edit_delta_chars: usize,

    /// Pause after each streaming edit, in milliseconds.
    #[serde(default = "default_stream_edit_pause_ms")]
    pub stream_edit_pause_ms: u64,

    /// Longest text sent in one message; longer answers are cut.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Persona assigned to new users.
    #[serde(default)]
    pub default_persona: PersonaId,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            new_dialog_timeout_secs: default_new_dialog_timeout_secs(),
            streaming: true,
            stream_edit_delta_chars: default_stream_edit_delta_chars(),
            stream_edit_pause_ms: default_stream_edit_pause_ms(),
            max_message_chars: default_max_message_chars(),
            default_persona: PersonaId::default(),
        }
    }
}

fn default_new_dialog_timeout_secs() -> u64 {
    600
}

fn default_stream_edit_delta_chars() -> usize {
    100
}

fn default_stream_edit_pause_ms() -> u64 {
    10
}

fn default_max_message_chars() -> usize {
    4096
}

/// Balance, pricing, and refill configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Balance granted on first contact.
    #[serde(default = "default_balance")]
    pub initial_balance: i64,

    /// Daily refill raises every lower balance to this value.
    #[serde(default = "default_balance")]
    pub refill_floor: i64,

    /// Cron expression (UTC) for the daily refill.
    #[serde(default = "default_refill_schedule")]
    pub refill_schedule: String,

    /// Users with unlimited balance and access to admin commands.
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    /// Flat token cost of one generated image.
    #[serde(default = "default_image_cost_tokens")]
    pub image_cost_tokens: i64,

    /// USD per 1000 chat tokens, used for display and voice cost conversion.
    #[serde(default = "default_chat_price")]
    pub chat_price_per_1000_tokens: f64,

    /// USD per minute of transcribed audio.
    #[serde(default = "default_transcription_price")]
    pub transcription_price_per_minute: f64,

    /// USD per generated image, for display.
    #[serde(default = "default_image_price")]
    pub image_price: f64,

    /// Rate used when no quote could ever be fetched.
    #[serde(default = "default_fallback_usd_rate")]
    pub fallback_usd_rate: f64,

    /// JSON endpoint with the daily USD rate.
    #[serde(default = "default_rate_source_url")]
    pub rate_source_url: String,

    /// The top-up package sold through `/buy`.
    #[serde(default)]
    pub package: PackageConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_balance(),
            refill_floor: default_balance(),
            refill_schedule: default_refill_schedule(),
            admin_ids: Vec::new(),
            image_cost_tokens: default_image_cost_tokens(),
            chat_price_per_1000_tokens: default_chat_price(),
            transcription_price_per_minute: default_transcription_price(),
            image_price: default_image_price(),
            fallback_usd_rate: default_fallback_usd_rate(),
            rate_source_url: default_rate_source_url(),
            package: PackageConfig::default(),
        }
    }
}

fn default_balance() -> i64 {
    10_000
}

fn default_refill_schedule() -> String {
    "0 7 * * *".to_string()
}

fn default_image_cost_tokens() -> i64 {
    1000
}

fn default_chat_price() -> f64 {
    0.002
}

fn default_transcription_price() -> f64 {
    0.006
}

fn default_image_price() -> f64 {
    0.02
}

fn default_fallback_usd_rate() -> f64 {
    75.0
}

fn default_rate_source_url() -> String {
    "https://www.cbr-xml-daily.ru/daily_json.js".to_string()
}

/// A purchasable balance package.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default = "default_package_title")]
    pub title: String,

    #[serde(default = "default_package_description")]
    pub description: String,

    /// Tokens credited after a successful payment.
    #[serde(default = "default_package_tokens")]
    pub tokens: i64,

    /// Price in the currency's minor unit (kopecks, cents).
    #[serde(default = "default_package_price_minor")]
    pub price_minor: i64,

    #[serde(default = "default_package_currency")]
    pub currency: String,

    /// Invoice payload; pre-checkout queries with any other payload are refused.
    #[serde(default = "default_package_payload")]
    pub payload: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            title: default_package_title(),
            description: default_package_description(),
            tokens: default_package_tokens(),
            price_minor: default_package_price_minor(),
            currency: default_package_currency(),
            payload: default_package_payload(),
        }
    }
}

fn default_package_title() -> String {
    "100 000 tokens".to_string()
}

fn default_package_description() -> String {
    "Balance top-up for chatting with the assistant".to_string()
}

fn default_package_tokens() -> i64 {
    100_000
}

fn default_package_price_minor() -> i64 {
    39_900
}

fn default_package_currency() -> String {
    "RUB".to_string()
}

fn default_package_payload() -> String {
    "parley-token-package".to_string()
}

/// Text prefixes routing a message into a side-flow.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Messages starting with this generate an image from the rest of the text.
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,

    /// Messages starting with this are answered with a voice note.
    #[serde(default = "default_speak_prefix")]
    pub speak_prefix: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            image_prefix: default_image_prefix(),
            speak_prefix: default_speak_prefix(),
        }
    }
}

fn default_image_prefix() -> String {
    "Нарисуй".to_string()
}

fn default_speak_prefix() -> String {
    "Расскажи".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ParleyConfig::default();
        assert_eq!(config.agent.name, "parley");
        assert_eq!(config.dialog.new_dialog_timeout_secs, 600);
        assert_eq!(config.dialog.stream_edit_delta_chars, 100);
        assert_eq!(config.billing.initial_balance, 10_000);
        assert_eq!(config.billing.image_cost_tokens, 1000);
        assert_eq!(config.billing.package.tokens, 100_000);
        assert!(config.telegram.allowed_users.is_empty());
        assert!(config.storage.database_path.ends_with("parley.db"));
    }
}
