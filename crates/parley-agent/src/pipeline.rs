// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The usage metering pipeline.
//!
//! One text turn moves through `admitted -> gate_wait -> trimmed ->
//! generating -> settling -> done`, exiting early as `rejected` (balance
//! exhausted, still busy) or `failed` (generation error). A failed turn is
//! neither appended nor charged. The gate permit is a guard value, so it is
//! released on every exit path.
//!
//! Image, voice and speech requests reuse the same admission, gate and
//! settle steps with a different provider call in the middle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parley_config::model::ParleyConfig;
use parley_context::{ContextEngine, persona};
use parley_core::types::{
    ChatId, ChatKind, GenerationEvent, GenerationOutcome, InboundContent, InboundMessage,
    OutboundMessage, Presence, ProviderRequest, Sender, Turn, UsageKind, UserAccount, UserId,
    UserUpdate,
};
use parley_core::{
    ChannelAdapter, MessageId, ParleyError, ProviderAdapter, RateSource, StorageAdapter,
};
use parley_cost::{BalanceLedger, PriceSheet, RateRefresher};
use tracing::{debug, error, info, warn};

use crate::delivery::AnswerDelivery;
use crate::dialogs::DialogStore;
use crate::gate::{GatePermit, RequestGate};
use crate::generation::Generator;
use crate::notices;
use crate::router::{Intent, IntentRouter};

/// Why a turn ended before generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BalanceExhausted,
    AlreadyProcessing,
}

/// States of one metered turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Account loaded or registered.
    Admitted,
    /// Acquiring the user's permit.
    GateWait,
    /// History read and trimmed to the context window.
    Trimmed,
    /// Waiting on the provider.
    Generating,
    /// Appending the turn and charging the ledger.
    Settling,
    Done,
    Rejected(RejectReason),
    /// The provider failed; nothing was appended or charged.
    Failed,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Admitted => write!(f, "admitted"),
            TurnState::GateWait => write!(f, "gate_wait"),
            TurnState::Trimmed => write!(f, "trimmed"),
            TurnState::Generating => write!(f, "generating"),
            TurnState::Settling => write!(f, "settling"),
            TurnState::Done => write!(f, "done"),
            TurnState::Rejected(RejectReason::BalanceExhausted) => {
                write!(f, "rejected(balance_exhausted)")
            }
            TurnState::Rejected(RejectReason::AlreadyProcessing) => {
                write!(f, "rejected(already_processing)")
            }
            TurnState::Failed => write!(f, "failed"),
        }
    }
}

fn advance(user: UserId, state: &mut TurnState, next: TurnState) {
    debug!(user_id = user.0, from = %state, to = %next, "turn state");
    *state = next;
}

/// Orchestrates admission, gating, generation and settling for every
/// inbound event.
pub struct MeteringPipeline {
    pub(crate) config: Arc<ParleyConfig>,
    pub(crate) storage: Arc<dyn StorageAdapter>,
    pub(crate) channel: Arc<dyn ChannelAdapter>,
    pub(crate) provider: Arc<dyn ProviderAdapter>,
    pub(crate) ledger: BalanceLedger,
    pub(crate) dialogs: DialogStore,
    pub(crate) gate: RequestGate,
    pub(crate) context: ContextEngine,
    pub(crate) generator: Generator,
    pub(crate) prices: PriceSheet,
    pub(crate) rates: RateRefresher,
    router: IntentRouter,
}

impl MeteringPipeline {
    pub fn new(
        config: Arc<ParleyConfig>,
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        rate_source: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            ledger: BalanceLedger::new(storage.clone()),
            dialogs: DialogStore::new(storage.clone()),
            gate: RequestGate::new(),
            context: ContextEngine::new(&config.openai),
            generator: Generator::new(provider.clone(), config.dialog.streaming),
            prices: PriceSheet::from_config(&config.billing),
            rates: RateRefresher::new(rate_source, config.billing.fallback_usd_rate),
            router: IntentRouter::new(config.triggers.clone()),
            config,
            storage,
            channel,
            provider,
        }
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn dialogs(&self) -> &DialogStore {
        &self.dialogs
    }

    /// Handles one inbound event. Unclassified failures are logged and
    /// reported to the user with a generic notice.
    pub async fn handle(&self, msg: InboundMessage) {
        let user = msg.sender.id;
        if let Err(e) = self.dispatch(&msg).await {
            match &e {
                e if e.is_user_facing() => debug!(user_id = user.0, error = %e, "event rejected"),
                e => {
                    error!(user_id = user.0, error = %e, "failed to handle inbound event");
                    self.notify(OutboundMessage::text(
                        msg.chat_id,
                        notices::generation_failed(&e.to_string()),
                    ))
                    .await;
                }
            }
        }
    }

    async fn dispatch(&self, msg: &InboundMessage) -> Result<(), ParleyError> {
        match &msg.content {
            InboundContent::Text(text) => match self.router.classify(text) {
                Intent::Command(command) => self.handle_command(msg, command).await,
                Intent::Image(prompt) => self.image_flow(msg, &prompt).await.map(drop),
                Intent::Speak(prompt) => self.speak_flow(msg, &prompt).await.map(drop),
                Intent::Chat(text) if text.is_empty() => Ok(()),
                Intent::Chat(text) => self.chat_turn(msg, &text).await.map(drop),
            },
            InboundContent::Voice {
                data,
                duration_secs,
            } => self
                .voice_flow(msg, data.clone(), *duration_secs)
                .await
                .map(drop),
            InboundContent::Button { action, .. } => self.handle_button(msg, *action).await,
            InboundContent::PaymentSucceeded(receipt) => self.handle_payment(msg, receipt).await,
            InboundContent::Edited => {
                self.notify(OutboundMessage::text(msg.chat_id, notices::EDITING_UNSUPPORTED))
                    .await;
                Ok(())
            }
        }
    }

    // --- Admission ---

    /// Loads the sender's account, registering it with a first dialog on
    /// first contact. Profile fields and the privileged flag are refreshed.
    pub async fn admit(&self, sender: &Sender) -> Result<UserAccount, ParleyError> {
        let mut account = match self.storage.get_user(sender.id).await? {
            Some(account) => account,
            None => self.register(sender).await?,
        };

        if account.profile() != &sender.profile {
            self.update_user(&mut account, UserUpdate::Profile(sender.profile.clone()))
                .await?;
        }
        let privileged = self.config.billing.admin_ids.contains(&sender.id.0);
        if account.is_privileged() != privileged {
            self.update_user(&mut account, UserUpdate::Privileged(privileged))
                .await?;
        }
        Ok(account)
    }

    async fn register(&self, sender: &Sender) -> Result<UserAccount, ParleyError> {
        let mut account = UserAccount::register(
            sender.id,
            sender.profile.clone(),
            self.config.billing.initial_balance,
            self.config.dialog.default_persona,
            self.rates.fallback_quote(),
            Utc::now(),
        );
        if !self.storage.insert_user(&account).await? {
            // A concurrent first contact registered the account already.
            return self.reload(sender.id).await;
        }
        self.dialogs.start_new_dialog(&mut account).await?;
        info!(
            user_id = sender.id.0,
            balance = account.balance(),
            "user registered"
        );
        Ok(account)
    }

    /// Reads the account again. Missing accounts after admission are an
    /// invariant violation.
    pub(crate) async fn reload(&self, user: UserId) -> Result<UserAccount, ParleyError> {
        self.storage
            .get_user(user)
            .await?
            .ok_or(ParleyError::UserNotFound { user: user.0 })
    }

    pub(crate) async fn update_user(
        &self,
        account: &mut UserAccount,
        update: UserUpdate,
    ) -> Result<(), ParleyError> {
        self.storage.update_user(account.id(), update.clone()).await?;
        account.apply(&update);
        Ok(())
    }

    /// Balance admission. Sends the exhausted notice and an upsell on refusal.
    pub(crate) async fn check_balance(
        &self,
        account: &mut UserAccount,
        chat: ChatId,
    ) -> Result<bool, ParleyError> {
        if self.ledger.has_sufficient(account).await? {
            return Ok(true);
        }
        self.notify(
            OutboundMessage::html(chat, notices::balance_exhausted())
                .with_keyboard(notices::buy_keyboard()),
        )
        .await;
        Ok(false)
    }

    /// Non-blocking gate entry. Sends the still-processing notice when busy.
    pub(crate) async fn enter(&self, user: UserId, chat: ChatId) -> Option<GatePermit> {
        let permit = self.gate.try_enter(user);
        if permit.is_none() {
            info!(user_id = user.0, "request refused: previous one still in flight");
            self.notify(OutboundMessage::text(chat, notices::STILL_PROCESSING))
                .await;
        }
        permit
    }

    /// Admission and gate entry shared by every metered flow.
    async fn admit_and_enter(
        &self,
        msg: &InboundMessage,
    ) -> Result<Result<(UserAccount, GatePermit), RejectReason>, ParleyError> {
        let mut account = self.admit(&msg.sender).await?;
        let user = account.id();
        let mut state = TurnState::Admitted;

        if !self.check_balance(&mut account, msg.chat_id).await? {
            advance(user, &mut state, TurnState::Rejected(RejectReason::BalanceExhausted));
            return Ok(Err(RejectReason::BalanceExhausted));
        }

        advance(user, &mut state, TurnState::GateWait);
        let Some(permit) = self.enter(user, msg.chat_id).await else {
            advance(user, &mut state, TurnState::Rejected(RejectReason::AlreadyProcessing));
            return Ok(Err(RejectReason::AlreadyProcessing));
        };
        // Another turn may have settled while this one was admitted.
        let account = self.reload(user).await?;
        Ok(Ok((account, permit)))
    }

    // --- Text turns ---

    /// Runs one chat turn for an inbound text.
    pub async fn chat_turn(
        &self,
        msg: &InboundMessage,
        text: &str,
    ) -> Result<TurnState, ParleyError> {
        let (mut account, permit) = match self.admit_and_enter(msg).await? {
            Ok(admitted) => admitted,
            Err(reason) => return Ok(TurnState::Rejected(reason)),
        };
        let history = self.prepare_history(&permit, &mut account, msg.chat_id).await?;
        self.run_turn(
            &permit,
            &mut account,
            msg.chat_id,
            Some(msg.id.clone()),
            text,
            history,
        )
        .await
    }

    /// Replays the last user message after removing its turn from history.
    ///
    /// Waits for any in-flight request of the same user instead of refusing.
    pub async fn retry(&self, msg: &InboundMessage) -> Result<TurnState, ParleyError> {
        let mut account = self.admit(&msg.sender).await?;
        if !self.check_balance(&mut account, msg.chat_id).await? {
            return Ok(TurnState::Rejected(RejectReason::BalanceExhausted));
        }

        let user = account.id();
        self.gate
            .run_exclusive(user, |permit| async move {
                let mut account = self.reload(user).await?;
                let mut history = self.dialogs.get_turns(&account).await?;
                let Some(last) = history.pop() else {
                    self.notify(OutboundMessage::text(msg.chat_id, notices::NOTHING_TO_RETRY))
                        .await;
                    return Ok(TurnState::Done);
                };
                self.touch(&mut account, Utc::now()).await?;
                self.run_turn(
                    &permit,
                    &mut account,
                    msg.chat_id,
                    None,
                    &last.user_text,
                    history,
                )
                .await
            })
            .await
    }

    /// Rotates a stale dialog, records activity and returns the current history.
    pub(crate) async fn prepare_history(
        &self,
        _permit: &GatePermit,
        account: &mut UserAccount,
        chat: ChatId,
    ) -> Result<Vec<Turn>, ParleyError> {
        let now = Utc::now();
        self.rotate_if_stale(account, chat, now).await?;
        self.touch(account, now).await?;
        self.dialogs.get_turns(account).await
    }

    async fn rotate_if_stale(
        &self,
        account: &mut UserAccount,
        chat: ChatId,
        now: DateTime<Utc>,
    ) -> Result<bool, ParleyError> {
        let timeout = Duration::from_secs(self.config.dialog.new_dialog_timeout_secs);
        if !account.is_inactive_for(timeout, now) {
            return Ok(false);
        }
        if self.dialogs.get_turns(account).await?.is_empty() {
            return Ok(false);
        }

        self.dialogs.start_new_dialog(account).await?;
        info!(user_id = account.id().0, "stale dialog rotated");
        self.notify(OutboundMessage::html(
            chat,
            notices::new_dialog_started(persona(account.persona())),
        ))
        .await;
        Ok(true)
    }

    pub(crate) async fn touch(
        &self,
        account: &mut UserAccount,
        now: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        self.update_user(account, UserUpdate::LastActivity(now)).await
    }

    /// Trim, generate, deliver, settle. The caller holds the permit.
    async fn run_turn(
        &self,
        _permit: &GatePermit,
        account: &mut UserAccount,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        history: Vec<Turn>,
    ) -> Result<TurnState, ParleyError> {
        let user = account.id();
        let mut state = TurnState::GateWait;

        self.presence(chat, Presence::Typing).await;
        let persona = persona(account.persona());
        let assembled = self.context.assemble(account.persona(), &history, text);
        advance(user, &mut state, TurnState::Trimmed);

        let mut delivery = AnswerDelivery::new(
            self.channel.as_ref(),
            chat,
            reply_to,
            persona.format,
            &self.config.dialog,
        );
        advance(user, &mut state, TurnState::Generating);
        let outcome = match self
            .generate(assembled.request, assembled.turns_dropped, &mut delivery)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id = user.0, error = %e, "generation failed, turn discarded");
                self.notify(
                    OutboundMessage::text(chat, notices::generation_failed(&e.to_string()))
                        .with_keyboard(notices::retry_keyboard()),
                )
                .await;
                advance(user, &mut state, TurnState::Failed);
                return Ok(state);
            }
        };

        advance(user, &mut state, TurnState::Settling);
        let shown = match outcome.answer.trim().is_empty() {
            true => notices::EMPTY_ANSWER,
            false => outcome.answer.as_str(),
        };
        if let Err(e) = delivery.finish(shown).await {
            warn!(user_id = user.0, error = %e, "final answer not delivered");
        }

        let mut turns = assembled.retained;
        turns.push(Turn::new(text, outcome.answer.clone()));
        self.dialogs.replace_turns(account, &turns).await?;
        self.ledger
            .settle(account, outcome.tokens_used, UsageKind::Chat)
            .await?;

        if outcome.turns_dropped > 0 {
            self.notify(OutboundMessage::html(
                chat,
                notices::truncated(outcome.turns_dropped),
            ))
            .await;
        }
        advance(user, &mut state, TurnState::Done);
        Ok(state)
    }

    async fn generate(
        &self,
        request: ProviderRequest,
        turns_dropped: usize,
        delivery: &mut AnswerDelivery<'_>,
    ) -> Result<GenerationOutcome, ParleyError> {
        let mut events = self.generator.start(request, turns_dropped).await?;
        while let Some(event) = events.next().await {
            match event? {
                GenerationEvent::Partial(answer) => delivery.partial(&answer).await,
                GenerationEvent::Finished(outcome) => return Ok(outcome),
            }
        }
        Err(ParleyError::generation("stream ended without a final answer"))
    }

    // --- Side-flows ---

    /// Generates an image from `prompt` at a fixed cost.
    pub async fn image_flow(
        &self,
        msg: &InboundMessage,
        prompt: &str,
    ) -> Result<TurnState, ParleyError> {
        if prompt.is_empty() {
            self.notify(OutboundMessage::text(msg.chat_id, notices::EMPTY_PROMPT))
                .await;
            return Ok(TurnState::Done);
        }
        let (mut account, _permit) = match self.admit_and_enter(msg).await? {
            Ok(admitted) => admitted,
            Err(reason) => return Ok(TurnState::Rejected(reason)),
        };
        self.touch(&mut account, Utc::now()).await?;
        self.presence(msg.chat_id, Presence::UploadPhoto).await;

        let url = match self.provider.generate_image(prompt).await {
            Ok(url) => url,
            Err(e) => return Ok(self.side_flow_failed(msg.chat_id, account.id(), &e).await),
        };
        if let Err(e) = self
            .channel
            .send_photo(msg.chat_id, &url, Some(prompt))
            .await
        {
            warn!(user_id = account.id().0, error = %e, "image not delivered");
        }
        self.ledger
            .settle(&mut account, self.prices.image_cost_tokens(), UsageKind::Image)
            .await?;
        Ok(TurnState::Done)
    }

    /// Transcribes a voice note, echoes it, then runs it as a chat turn
    /// under the same permit.
    pub async fn voice_flow(
        &self,
        msg: &InboundMessage,
        audio: Vec<u8>,
        duration_secs: u32,
    ) -> Result<TurnState, ParleyError> {
        if msg.chat_kind == ChatKind::Group {
            self.notify(OutboundMessage::text(msg.chat_id, notices::VOICE_IN_GROUP))
                .await;
            return Ok(TurnState::Done);
        }
        let (mut account, permit) = match self.admit_and_enter(msg).await? {
            Ok(admitted) => admitted,
            Err(reason) => return Ok(TurnState::Rejected(reason)),
        };
        self.presence(msg.chat_id, Presence::RecordVoice).await;

        let text = match self.provider.transcribe(audio, "voice.ogg").await {
            Ok(text) => text.trim().to_string(),
            Err(e) => return Ok(self.side_flow_failed(msg.chat_id, account.id(), &e).await),
        };
        self.notify(
            OutboundMessage::html(msg.chat_id, notices::transcribed(&text)).reply_to(msg.id.clone()),
        )
        .await;
        self.ledger
            .settle(
                &mut account,
                self.prices.voice_cost_tokens(duration_secs),
                UsageKind::Transcription,
            )
            .await?;

        if text.is_empty() {
            return Ok(TurnState::Done);
        }
        let history = self
            .prepare_history(&permit, &mut account, msg.chat_id)
            .await?;
        self.run_turn(
            &permit,
            &mut account,
            msg.chat_id,
            Some(msg.id.clone()),
            &text,
            history,
        )
        .await
    }

    /// Answers `prompt` with a synthesized voice note. The exchange is not
    /// added to the dialog.
    pub async fn speak_flow(
        &self,
        msg: &InboundMessage,
        prompt: &str,
    ) -> Result<TurnState, ParleyError> {
        if prompt.is_empty() {
            self.notify(OutboundMessage::text(msg.chat_id, notices::EMPTY_PROMPT))
                .await;
            return Ok(TurnState::Done);
        }
        let (mut account, _permit) = match self.admit_and_enter(msg).await? {
            Ok(admitted) => admitted,
            Err(reason) => return Ok(TurnState::Rejected(reason)),
        };
        self.touch(&mut account, Utc::now()).await?;
        self.presence(msg.chat_id, Presence::Typing).await;

        let request = self.context.single(account.persona(), prompt);
        let outcome = match self.generator.complete(request, 0).await {
            Ok(outcome) => outcome,
            Err(e) => return Ok(self.side_flow_failed(msg.chat_id, account.id(), &e).await),
        };

        if outcome.answer.contains('<') || outcome.answer.contains('>') {
            self.notify(OutboundMessage::text(msg.chat_id, notices::SPEAK_REFUSED))
                .await;
        } else {
            self.presence(msg.chat_id, Presence::RecordVoice).await;
            match self.provider.synthesize(&outcome.answer).await {
                Ok(audio) => {
                    if let Err(e) = self
                        .channel
                        .send_voice(msg.chat_id, audio, Some(&msg.id))
                        .await
                    {
                        warn!(user_id = account.id().0, error = %e, "voice reply not delivered");
                    }
                }
                Err(e) => {
                    warn!(user_id = account.id().0, error = %e, "speech synthesis failed");
                    self.notify(OutboundMessage::text(
                        msg.chat_id,
                        notices::generation_failed(&e.to_string()),
                    ))
                    .await;
                }
            }
        }

        self.ledger
            .settle(&mut account, outcome.tokens_used, UsageKind::Speech)
            .await?;
        Ok(TurnState::Done)
    }

    async fn side_flow_failed(&self, chat: ChatId, user: UserId, err: &ParleyError) -> TurnState {
        warn!(user_id = user.0, error = %err, "provider call failed, nothing charged");
        self.notify(OutboundMessage::text(
            chat,
            notices::generation_failed(&err.to_string()),
        ))
        .await;
        TurnState::Failed
    }

    // --- Transport helpers ---

    /// Sends a notice. Delivery failures are logged, never propagated.
    pub(crate) async fn notify(&self, msg: OutboundMessage) -> Option<MessageId> {
        let chat = msg.chat_id;
        match self.channel.send(msg).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat_id = chat.0, error = %e, "notice not delivered");
                None
            }
        }
    }

    async fn presence(&self, chat: ChatId, presence: Presence) {
        if !self.channel.capabilities().supports_presence {
            return;
        }
        if let Err(e) = self.channel.send_presence(chat, presence).await {
            debug!(chat_id = chat.0, error = %e, "presence hint failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_in_snake_case() {
        assert_eq!(TurnState::GateWait.to_string(), "gate_wait");
        assert_eq!(
            TurnState::Rejected(RejectReason::AlreadyProcessing).to_string(),
            "rejected(already_processing)"
        );
        assert_eq!(TurnState::Failed.to_string(), "failed");
    }
}
