// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the metering pipeline over mock adapters and a
//! temp SQLite database, and provides helpers that drive inbound events
//! through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parley_agent::{MeteringPipeline, TurnState};
use parley_config::model::{ParleyConfig, StorageConfig};
use parley_core::types::{
    ButtonAction, ChatId, ChatKind, InboundContent, InboundMessage, PaymentReceipt, Sender, Turn,
    UserAccount, UserId, UserProfile, UserUpdate,
};
use parley_core::{ChannelAdapter, MessageId, ParleyError, ProviderAdapter, StorageAdapter};
use parley_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::mock_provider::MockProvider;
use crate::mock_rates::MockRateSource;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: ParleyConfig,
    channel: Option<MockChannel>,
    rates: Option<MockRateSource>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ParleyConfig::default();
        config.dialog.streaming = false;
        config.dialog.stream_edit_pause_ms = 0;
        Self {
            responses: Vec::new(),
            config,
            channel: None,
            rates: None,
        }
    }

    /// Set mock provider responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Adjust the configuration before the pipeline is built.
    pub fn with_config(mut self, configure: impl FnOnce(&mut ParleyConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    /// Enable incremental delivery.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.config.dialog.streaming = streaming;
        self
    }

    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_rate_source(mut self, rates: MockRateSource) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParleyError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };
        let config = Arc::new(config);

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let provider = Arc::new(match self.responses.is_empty() {
            true => MockProvider::new(),
            false => MockProvider::with_responses(self.responses),
        });
        let channel = Arc::new(self.channel.unwrap_or_default());
        let rates = Arc::new(self.rates.unwrap_or_else(|| MockRateSource::new(90.0)));

        let pipeline = Arc::new(MeteringPipeline::new(
            config.clone(),
            storage.clone() as Arc<dyn StorageAdapter>,
            channel.clone() as Arc<dyn ChannelAdapter>,
            provider.clone() as Arc<dyn ProviderAdapter>,
            rates.clone(),
        ));

        Ok(TestHarness {
            pipeline,
            mock_provider: provider,
            mock_channel: channel,
            mock_rates: rates,
            storage,
            config,
            next_message: AtomicU64::new(1),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The pipeline under test.
    pub pipeline: Arc<MeteringPipeline>,
    pub mock_provider: Arc<MockProvider>,
    pub mock_channel: Arc<MockChannel>,
    pub mock_rates: Arc<MockRateSource>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub config: Arc<ParleyConfig>,
    next_message: AtomicU64,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// An inbound event from `user` in their private chat.
    pub fn inbound(&self, user: i64, content: InboundContent) -> InboundMessage {
        let id = self.next_message.fetch_add(1, Ordering::SeqCst);
        InboundMessage {
            id: MessageId(format!("in-{id}")),
            chat_id: ChatId(user),
            chat_kind: ChatKind::Private,
            sender: Sender {
                id: UserId(user),
                profile: UserProfile {
                    first_name: Some(format!("User{user}")),
                    last_name: None,
                    username: Some(format!("user{user}")),
                },
            },
            content,
            timestamp: Utc::now(),
        }
    }

    /// Routes `text` from `user` through the full pipeline, commands included.
    pub async fn send_message(&self, user: i64, text: &str) {
        let msg = self.inbound(user, InboundContent::Text(text.to_string()));
        self.pipeline.handle(msg).await;
    }

    /// Runs one chat turn directly and returns where it ended.
    pub async fn chat(&self, user: i64, text: &str) -> Result<TurnState, ParleyError> {
        let msg = self.inbound(user, InboundContent::Text(text.to_string()));
        self.pipeline.chat_turn(&msg, text).await
    }

    pub async fn press(&self, user: i64, action: ButtonAction) {
        let msg = self.inbound(
            user,
            InboundContent::Button {
                action,
                message_id: None,
            },
        );
        self.pipeline.handle(msg).await;
    }

    pub async fn send_voice(&self, user: i64, duration_secs: u32) {
        let msg = self.inbound(
            user,
            InboundContent::Voice {
                data: vec![0u8; 16],
                duration_secs,
            },
        );
        self.pipeline.handle(msg).await;
    }

    pub async fn pay(&self, user: i64, payload: &str) {
        let receipt = PaymentReceipt {
            payload: payload.to_string(),
            currency: self.config.billing.package.currency.clone(),
            total_amount: self.config.billing.package.price_minor,
            charge_id: format!("charge-{user}"),
        };
        let msg = self.inbound(user, InboundContent::PaymentSucceeded(receipt));
        self.pipeline.handle(msg).await;
    }

    /// Registers `user` and sets their balance.
    pub async fn seed_user(&self, user: i64, balance: i64) -> Result<UserAccount, ParleyError> {
        let msg = self.inbound(user, InboundContent::Text(String::new()));
        let account = self.pipeline.admit(&msg.sender).await?;
        self.storage.set_balance(account.id(), balance).await?;
        self.account(user).await
    }

    /// Moves the user's last activity `secs` into the past.
    pub async fn age_activity(&self, user: i64, secs: i64) -> Result<(), ParleyError> {
        let at = Utc::now() - chrono::Duration::seconds(secs);
        self.storage
            .update_user(UserId(user), UserUpdate::LastActivity(at))
            .await
    }

    pub async fn account(&self, user: i64) -> Result<UserAccount, ParleyError> {
        self.storage
            .get_user(UserId(user))
            .await?
            .ok_or(ParleyError::UserNotFound { user })
    }

    /// Turns of the user's active dialog.
    pub async fn turns(&self, user: i64) -> Result<Vec<Turn>, ParleyError> {
        let account = self.account(user).await?;
        self.pipeline.dialogs().get_turns(&account).await
    }
}
