// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifies inbound text into intents.

use parley_config::model::TriggerConfig;
use parley_core::types::UserId;

/// A slash command with its parsed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Profile,
    NewDialog,
    Mode,
    Retry,
    Balance,
    Buy,
    Reset(UserId),
    Add(UserId, i64),
    Delete(UserId),
    Users,
    Broadcast(String),
    Refill,
    /// A command that is unknown or whose arguments did not parse.
    Invalid(String),
}

impl Command {
    /// Admin commands require a privileged account.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Reset(_)
                | Self::Add(..)
                | Self::Delete(_)
                | Self::Users
                | Self::Broadcast(_)
                | Self::Refill
        )
    }

    fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix('/')?;
        let (head, args) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(h, a)| (h, a.trim()));
        // "/new@parley_bot" in groups.
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let mut words = args.split_whitespace();
        let user = |w: Option<&str>| w.and_then(|w| w.parse::<i64>().ok()).map(UserId);

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "profile" => Self::Profile,
            "new" => Self::NewDialog,
            "mode" => Self::Mode,
            "retry" => Self::Retry,
            "balance" => Self::Balance,
            "buy" => Self::Buy,
            "reset" => match user(words.next()) {
                Some(id) => Self::Reset(id),
                None => Self::Invalid("usage: /reset <user_id>".into()),
            },
            "add" => match (user(words.next()), words.next().and_then(|w| w.parse().ok())) {
                (Some(id), Some(amount)) => Self::Add(id, amount),
                _ => Self::Invalid("usage: /add <user_id> <amount>".into()),
            },
            "delete" => match user(words.next()) {
                Some(id) => Self::Delete(id),
                None => Self::Invalid("usage: /delete <user_id>".into()),
            },
            "users" => Self::Users,
            "broadcast" if !args.is_empty() => Self::Broadcast(args.to_string()),
            "broadcast" => Self::Invalid("usage: /broadcast <text>".into()),
            "refill" => Self::Refill,
            _ => Self::Invalid(String::new()),
        };
        Some(command)
    }
}

/// What an inbound text asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command(Command),
    Image(String),
    Speak(String),
    Chat(String),
}

/// Strips a case-insensitive trigger word from the start of `text`.
fn strip_trigger<'a>(text: &'a str, trigger: &str) -> Option<&'a str> {
    if trigger.is_empty() {
        return None;
    }
    let prefix_len = text
        .char_indices()
        .nth(trigger.chars().count())
        .map_or(text.len(), |(idx, _)| idx);
    let (head, rest) = text.split_at(prefix_len);
    (head.to_lowercase() == trigger.to_lowercase()).then(|| rest.trim())
}

/// Routes text using the configured trigger words.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    triggers: TriggerConfig,
}

impl IntentRouter {
    pub fn new(triggers: TriggerConfig) -> Self {
        Self { triggers }
    }

    pub fn classify(&self, text: &str) -> Intent {
        let text = text.trim();
        if let Some(command) = Command::parse(text) {
            return Intent::Command(command);
        }
        if let Some(prompt) = strip_trigger(text, &self.triggers.image_prefix) {
            return Intent::Image(prompt.to_string());
        }
        if let Some(prompt) = strip_trigger(text, &self.triggers.speak_prefix) {
            return Intent::Speak(prompt.to_string());
        }
        Intent::Chat(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        IntentRouter::new(TriggerConfig::default())
    }

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(router().classify(" hello "), Intent::Chat("hello".into()));
    }

    #[test]
    fn commands_ignore_bot_suffix_and_case() {
        assert_eq!(
            router().classify("/New@parley_bot"),
            Intent::Command(Command::NewDialog)
        );
        assert_eq!(router().classify("/retry"), Intent::Command(Command::Retry));
    }

    #[test]
    fn admin_commands_parse_arguments() {
        assert_eq!(
            router().classify("/add 42 1500"),
            Intent::Command(Command::Add(UserId(42), 1500))
        );
        assert_eq!(
            router().classify("/broadcast  maintenance at 9 "),
            Intent::Command(Command::Broadcast("maintenance at 9".into()))
        );
        assert!(matches!(
            router().classify("/reset abc"),
            Intent::Command(Command::Invalid(_))
        ));
        assert!(Command::Refill.is_admin());
        assert!(!Command::Balance.is_admin());
    }

    #[test]
    fn unknown_command_is_invalid() {
        assert_eq!(
            router().classify("/dance"),
            Intent::Command(Command::Invalid(String::new()))
        );
    }

    #[test]
    fn trigger_words_are_case_insensitive() {
        assert_eq!(
            router().classify("нарисуй кота в шляпе"),
            Intent::Image("кота в шляпе".into())
        );
        assert_eq!(
            router().classify("Расскажи сказку"),
            Intent::Speak("сказку".into())
        );
    }

    #[test]
    fn trigger_word_in_the_middle_is_chat() {
        assert_eq!(
            router().classify("Please Нарисуй"),
            Intent::Chat("Please Нарисуй".into())
        );
    }
}
