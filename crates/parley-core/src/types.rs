// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the adapters and the metering core.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Messaging-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messaging-platform chat identifier. Negative for group chats on Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque dialog (conversation session) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId(pub String);

impl DialogId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a message on the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
    RateSource,
}

// --- Personas ---

/// Persona tag selecting a system prompt and response format.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PersonaId {
    #[default]
    Assistant,
    CodeAssistant,
    EnglishTutor,
    Psychologist,
    MovieExpert,
}

/// How outbound text should be rendered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Plain,
    Html,
}

// --- Users ---

/// Informational name fields reported by the messaging platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl UserProfile {
    /// Best human-readable name: "First Last", else "@username", else "".
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.username
            .as_deref()
            .map(|u| format!("@{u}"))
            .unwrap_or_default()
    }
}

/// A cached currency conversion rate (local currency per USD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxQuote {
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

impl FxQuote {
    /// Quotes older than one day are refreshed before display.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.as_of) > chrono::Duration::days(1)
    }
}

/// Flat row representation of a user account, as read from or written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub profile: UserProfile,
    pub balance: i64,
    pub total_used: i64,
    pub persona: PersonaId,
    pub active_dialog: Option<DialogId>,
    pub last_activity_at: DateTime<Utc>,
    pub is_privileged: bool,
    pub is_paying: bool,
    pub fx: FxQuote,
    pub created_at: DateTime<Utc>,
}

/// The user aggregate threaded through the pipeline.
///
/// Balance and usage are never negative. They change only through the ledger
/// primitives on the storage adapter, so this type exposes no setters for them.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    record: UserRecord,
}

impl UserAccount {
    /// Builds the account created on first contact.
    pub fn register(
        id: UserId,
        profile: UserProfile,
        initial_balance: i64,
        persona: PersonaId,
        fx: FxQuote,
        now: DateTime<Utc>,
    ) -> Self {
        UserRecord {
            id,
            profile,
            balance: initial_balance,
            total_used: 0,
            persona,
            active_dialog: None,
            last_activity_at: now,
            is_privileged: false,
            is_paying: false,
            fx,
            created_at: now,
        }
        .into()
    }

    pub fn id(&self) -> UserId {
        self.record.id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.record.profile
    }

    pub fn balance(&self) -> i64 {
        self.record.balance
    }

    pub fn total_used(&self) -> i64 {
        self.record.total_used
    }

    pub fn persona(&self) -> PersonaId {
        self.record.persona
    }

    pub fn active_dialog(&self) -> Option<&DialogId> {
        self.record.active_dialog.as_ref()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.record.last_activity_at
    }

    pub fn is_privileged(&self) -> bool {
        self.record.is_privileged
    }

    pub fn is_paying(&self) -> bool {
        self.record.is_paying
    }

    pub fn fx_quote(&self) -> FxQuote {
        self.record.fx
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    /// Admission check: a non-zero balance, or privileged.
    ///
    /// This does not estimate the cost of the upcoming request. A single
    /// expensive request may overdraw to zero; the next one is then refused.
    pub fn has_sufficient_balance(&self) -> bool {
        self.record.balance > 0 || self.record.is_privileged
    }

    /// True when the user has been inactive for longer than `timeout`.
    pub fn is_inactive_for(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.record.last_activity_at);
        match chrono::Duration::from_std(timeout) {
            Ok(limit) => idle > limit,
            Err(_) => false,
        }
    }

    /// Applies a single-field update locally, mirroring what storage persisted.
    pub fn apply(&mut self, update: &UserUpdate) {
        match update {
            UserUpdate::Profile(profile) => self.record.profile = profile.clone(),
            UserUpdate::Persona(persona) => self.record.persona = *persona,
            UserUpdate::ActiveDialog(id) => self.record.active_dialog = Some(id.clone()),
            UserUpdate::LastActivity(at) => self.record.last_activity_at = *at,
            UserUpdate::Fx(quote) => self.record.fx = *quote,
            UserUpdate::Paying(flag) => self.record.is_paying = *flag,
            UserUpdate::Privileged(flag) => self.record.is_privileged = *flag,
        }
    }

    /// Records a balance value returned by a ledger primitive.
    pub fn observe_balance(&mut self, balance: i64) {
        self.record.balance = balance.max(0);
    }

    pub fn as_record(&self) -> &UserRecord {
        &self.record
    }
}

impl From<UserRecord> for UserAccount {
    fn from(mut record: UserRecord) -> Self {
        record.balance = record.balance.max(0);
        record.total_used = record.total_used.max(0);
        Self { record }
    }
}

impl From<UserAccount> for UserRecord {
    fn from(account: UserAccount) -> Self {
        account.record
    }
}

/// Atomic single-field update of a user account.
///
/// Balance and usage are deliberately absent: they are written only through
/// the ledger primitives (`credit_balance`, `debit_balance`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum UserUpdate {
    Profile(UserProfile),
    Persona(PersonaId),
    ActiveDialog(DialogId),
    LastActivity(DateTime<Utc>),
    Fx(FxQuote),
    Paying(bool),
    Privileged(bool),
}

// --- Dialogs ---

/// One user-message / assistant-response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub assistant_text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            created_at: Utc::now(),
        }
    }
}

/// An ordered session of turns owned by one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialog {
    pub id: DialogId,
    pub user_id: UserId,
    pub persona: PersonaId,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Dialog {
    /// An empty dialog tagged with `persona`.
    pub fn start(user_id: UserId, persona: PersonaId) -> Self {
        Self {
            id: DialogId::generate(),
            user_id,
            persona,
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }
}

// --- Usage log ---

/// What a ledger debit paid for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum UsageKind {
    Chat,
    Image,
    Transcription,
    Speech,
}

/// One metered operation, kept as an audit trail next to the running totals.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: UserId,
    pub kind: UsageKind,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(user_id: UserId, kind: UsageKind, tokens: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            tokens,
            created_at: Utc::now(),
        }
    }
}

// --- Generation ---

/// Message role in a provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat completion request. The model is chosen by the provider's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A full (non-streaming) completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// One increment of a streaming completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStreamChunk {
    pub delta: Option<String>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Final result of one generation, identical for batch and streaming modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub answer: String,
    pub tokens_used: u64,
    pub turns_dropped: usize,
}

/// Events produced while a generation is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// The accumulated answer so far.
    Partial(String),
    /// The generation completed.
    Finished(GenerationOutcome),
}

// --- Channel ---

/// Private conversation or group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// Who sent an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub id: UserId,
    pub profile: UserProfile,
}

/// Inline keyboard actions, round-tripped through the transport as short strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    ShowPersonas,
    SetPersona(PersonaId),
    NewDialog,
    Retry,
    Buy,
    Balance,
}

impl ButtonAction {
    /// Compact wire form used as callback data.
    pub fn encode(&self) -> String {
        match self {
            Self::ShowPersonas => "personas".to_string(),
            Self::SetPersona(p) => format!("persona|{p}"),
            Self::NewDialog => "new".to_string(),
            Self::Retry => "retry".to_string(),
            Self::Buy => "buy".to_string(),
            Self::Balance => "balance".to_string(),
        }
    }

    /// Parses callback data produced by [`ButtonAction::encode`].
    pub fn decode(data: &str) -> Option<Self> {
        match data {
            "personas" => Some(Self::ShowPersonas),
            "new" => Some(Self::NewDialog),
            "retry" => Some(Self::Retry),
            "buy" => Some(Self::Buy),
            "balance" => Some(Self::Balance),
            other => other
                .strip_prefix("persona|")
                .and_then(|p| p.parse::<PersonaId>().ok())
                .map(Self::SetPersona),
        }
    }
}

/// A successful payment notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub payload: String,
    pub currency: String,
    pub total_amount: i64,
    pub charge_id: String,
}

/// Payload of an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundContent {
    /// Plain text, including `/commands`.
    Text(String),
    /// A voice note, already downloaded.
    Voice { data: Vec<u8>, duration_secs: u32 },
    /// An inline keyboard press on a previously sent message.
    Button {
        action: ButtonAction,
        message_id: Option<MessageId>,
    },
    /// The payment processor confirmed a charge.
    PaymentSucceeded(PaymentReceipt),
    /// The user edited an earlier message.
    Edited,
}

/// An inbound event received from a channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub sender: Sender,
    pub content: InboundContent,
    pub timestamp: DateTime<Utc>,
}

/// A labelled inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: ButtonAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// An outbound text message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub format: OutputFormat,
    pub reply_to: Option<MessageId>,
    pub keyboard: Vec<Vec<Button>>,
}

impl OutboundMessage {
    /// Plain-text message to `chat_id`.
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            format: OutputFormat::Plain,
            reply_to: None,
            keyboard: Vec::new(),
        }
    }

    /// HTML-formatted message to `chat_id`.
    pub fn html(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            format: OutputFormat::Html,
            ..Self::text(chat_id, text)
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn reply_to(mut self, id: MessageId) -> Self {
        self.reply_to = Some(id);
        self
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Presence hint shown while work is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Typing,
    RecordVoice,
    UploadPhoto,
}

/// An invoice for a balance top-up package.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub chat_id: ChatId,
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    pub price_minor: i64,
    pub label: String,
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCapabilities {
    pub supports_edit: bool,
    pub supports_presence: bool,
    pub supports_payments: bool,
    pub max_message_length: Option<usize>,
}
