// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the metering pipeline.
//!
//! Each test creates an isolated TestHarness with temp SQLite and mock
//! adapters. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parley_agent::notices;
use parley_agent::{AgentLoop, RefillScheduler, RejectReason, TurnState};
use parley_context::estimate::message_cost;
use parley_context::persona;
use parley_core::types::{ButtonAction, ChatId, InboundContent, PersonaId, Turn, UsageKind};
use parley_core::{ChannelAdapter, StorageAdapter};
use parley_test_utils::{MockChannel, TestHarness};
use tokio_util::sync::CancellationToken;

async fn sent_contains(harness: &TestHarness, needle: &str) -> bool {
    harness
        .mock_channel
        .sent_texts()
        .await
        .iter()
        .any(|t| t.contains(needle))
}

// ---- Chat turns ----

#[tokio::test]
async fn test_chat_turn_appends_and_charges_reported_usage() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 500).await.unwrap();
    harness.mock_provider.add_response("Paris.", Some(42)).await;

    let state = harness.chat(1, "Capital of France?").await.unwrap();
    assert_eq!(state, TurnState::Done);

    let account = harness.account(1).await.unwrap();
    assert_eq!(account.balance(), 458);
    assert_eq!(account.total_used(), 42);

    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "Capital of France?");
    assert_eq!(turns[0].assistant_text, "Paris.");

    assert!(sent_contains(&harness, "Paris.").await);
    assert!(!sent_contains(&harness, "too long").await);
    assert_eq!(
        harness.storage.usage_summary(account.id()).await.unwrap(),
        vec![(UsageKind::Chat, 42)]
    );
}

#[tokio::test]
async fn test_history_is_sent_with_the_next_turn() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["first answer".into(), "second answer".into()])
        .build()
        .await
        .unwrap();

    harness.chat(1, "one").await.unwrap();
    harness.chat(1, "two").await.unwrap();

    let requests = harness.mock_provider.requests().await;
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(requests[1].messages[2].content, "first answer");
    assert_eq!(harness.turns(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_exhausted_balance_is_rejected_before_generation() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 0).await.unwrap();

    let state = harness.chat(1, "hello").await.unwrap();
    assert_eq!(state, TurnState::Rejected(RejectReason::BalanceExhausted));
    assert_eq!(harness.mock_provider.calls(), 0);
    assert_eq!(harness.account(1).await.unwrap().balance(), 0);
    assert!(harness.turns(1).await.unwrap().is_empty());
    assert!(sent_contains(&harness, "balance is exhausted").await);
}

#[tokio::test]
async fn test_overdrawn_account_is_refused_on_next_message() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 10).await.unwrap();
    harness.mock_provider.add_response("long answer", Some(500)).await;

    assert_eq!(harness.chat(1, "hi").await.unwrap(), TurnState::Done);
    assert_eq!(harness.mock_provider.calls(), 1);

    let state = harness.chat(1, "and again").await.unwrap();
    assert_eq!(state, TurnState::Rejected(RejectReason::BalanceExhausted));
    assert_eq!(harness.mock_provider.calls(), 1);
    assert_eq!(harness.account(1).await.unwrap().total_used(), 500);
    assert_eq!(harness.turns(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_last_turn_may_overdraw_but_balance_floors_at_zero() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 10).await.unwrap();
    harness.mock_provider.add_response("long answer", Some(500)).await;

    assert_eq!(harness.chat(1, "hi").await.unwrap(), TurnState::Done);
    let account = harness.account(1).await.unwrap();
    assert_eq!(account.balance(), 0);
    assert_eq!(account.total_used(), 500);
}

#[tokio::test]
async fn test_second_request_while_busy_is_refused() {
    let harness = Arc::new(TestHarness::builder().build().await.unwrap());
    harness.seed_user(1, 1000).await.unwrap();
    harness.mock_provider.add_response("slow answer", Some(30)).await;
    harness.mock_provider.hold();

    let first = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.chat(1, "first").await })
    };
    harness.mock_provider.wait_for_call().await;

    let second = harness.chat(1, "second").await.unwrap();
    assert_eq!(second, TurnState::Rejected(RejectReason::AlreadyProcessing));
    assert!(sent_contains(&harness, notices::STILL_PROCESSING).await);

    harness.mock_provider.release();
    assert_eq!(first.await.unwrap().unwrap(), TurnState::Done);

    assert_eq!(harness.mock_provider.calls(), 1);
    assert_eq!(harness.account(1).await.unwrap().balance(), 970);
    assert_eq!(harness.turns(1).await.unwrap().len(), 1);
    assert!(!harness.pipeline.gate().is_busy(harness.account(1).await.unwrap().id()));

    harness.mock_provider.add_response("quick answer", Some(20)).await;
    let third = harness.chat(1, "third").await.unwrap();
    assert_eq!(third, TurnState::Done);
    assert_eq!(harness.mock_provider.calls(), 2);
    assert_eq!(harness.account(1).await.unwrap().balance(), 950);
    assert_eq!(harness.turns(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_different_users_proceed_concurrently() {
    let harness = Arc::new(TestHarness::builder().build().await.unwrap());
    harness.mock_provider.hold();

    let tasks: Vec<_> = [1, 2]
        .into_iter()
        .map(|user| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.chat(user, "hello").await })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.mock_provider.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both users reach the provider");

    harness.mock_provider.release();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), TurnState::Done);
    }
}

#[tokio::test]
async fn test_failed_generation_is_neither_appended_nor_charged() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 500).await.unwrap();
    harness.mock_provider.add_failure("upstream unavailable").await;

    let state = harness.chat(1, "hello").await.unwrap();
    assert_eq!(state, TurnState::Failed);

    let account = harness.account(1).await.unwrap();
    assert_eq!(account.balance(), 500);
    assert_eq!(account.total_used(), 0);
    assert!(harness.turns(1).await.unwrap().is_empty());
    assert!(sent_contains(&harness, "upstream unavailable").await);

    // The gate is free again after the failure.
    assert!(!harness.pipeline.gate().is_busy(account.id()));
    assert_eq!(harness.chat(1, "again").await.unwrap(), TurnState::Done);
}

#[tokio::test]
async fn test_missing_usage_falls_back_to_estimate() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 500).await.unwrap();
    harness.mock_provider.add_response("ok", None).await;

    harness.chat(1, "hello").await.unwrap();
    let account = harness.account(1).await.unwrap();
    assert!(account.total_used() > 0);
    assert_eq!(account.balance(), 500 - account.total_used());
}

#[tokio::test]
async fn test_privileged_user_is_admitted_at_zero_and_not_debited() {
    let harness = TestHarness::builder()
        .with_config(|c| c.billing.admin_ids = vec![7])
        .build()
        .await
        .unwrap();
    harness.seed_user(7, 0).await.unwrap();
    harness.mock_provider.add_response("sure", Some(50)).await;

    assert_eq!(harness.chat(7, "hi").await.unwrap(), TurnState::Done);
    let account = harness.account(7).await.unwrap();
    assert!(account.is_privileged());
    assert_eq!(account.balance(), 0);
    assert_eq!(account.total_used(), 50);
}

// ---- Dialog lifecycle ----

#[tokio::test]
async fn test_stale_dialog_is_rotated_before_the_turn() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.chat(1, "remember this").await.unwrap();
    let old_dialog = harness.account(1).await.unwrap().active_dialog().cloned();

    let timeout = harness.config.dialog.new_dialog_timeout_secs as i64;
    harness.age_activity(1, timeout + 1).await.unwrap();
    harness.chat(1, "fresh start").await.unwrap();

    let requests = harness.mock_provider.requests().await;
    assert_eq!(requests[1].messages.len(), 2);

    let account = harness.account(1).await.unwrap();
    assert_ne!(account.active_dialog().cloned(), old_dialog);
    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "fresh start");
    assert!(sent_contains(&harness, "Starting new dialog due to timeout").await);
}

#[tokio::test]
async fn test_idle_user_with_empty_history_is_not_rotated() {
    let harness = TestHarness::builder().build().await.unwrap();
    let seeded = harness.seed_user(1, 500).await.unwrap();
    harness.age_activity(1, 100_000).await.unwrap();

    harness.chat(1, "hi").await.unwrap();
    let account = harness.account(1).await.unwrap();
    assert_eq!(account.active_dialog(), seeded.active_dialog());
    assert!(!sent_contains(&harness, "due to timeout").await);
}

#[tokio::test]
async fn test_oldest_turns_are_trimmed_and_reported() {
    let reply_reserve: u32 = 100;
    let system = persona(PersonaId::default()).system_prompt;
    // Room for exactly one 208-token turn of history.
    let window = reply_reserve as usize + message_cost(system) + message_cost("next") + 250;
    let harness = TestHarness::builder()
        .with_config(|c| {
            c.openai.max_tokens = reply_reserve;
            c.openai.context_window = window;
        })
        .build()
        .await
        .unwrap();

    let account = harness.seed_user(1, 10_000).await.unwrap();
    let old: Vec<Turn> = (0..3)
        .map(|_| Turn::new("x".repeat(400), "y".repeat(400)))
        .collect();
    let dialog = account.active_dialog().cloned().unwrap();
    harness.storage.replace_turns(&dialog, &old).await.unwrap();

    harness.mock_provider.add_response("short", Some(10)).await;
    assert_eq!(harness.chat(1, "next").await.unwrap(), TurnState::Done);

    let request = &harness.mock_provider.requests().await[0];
    assert_eq!(request.messages.len(), 4);

    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].user_text, "next");
    assert!(sent_contains(&harness, "2 first messages").await);
}

#[tokio::test]
async fn test_retry_replaces_the_last_turn() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["draft".into(), "better".into()])
        .build()
        .await
        .unwrap();

    harness.chat(1, "write a haiku").await.unwrap();
    harness.send_message(1, "/retry").await;

    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "write a haiku");
    assert_eq!(turns[0].assistant_text, "better");

    let requests = harness.mock_provider.requests().await;
    assert_eq!(requests[1].messages.len(), 2);
    assert_eq!(harness.account(1).await.unwrap().total_used(), 60);
}

#[tokio::test]
async fn test_failed_retry_keeps_history() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["draft".into()])
        .build()
        .await
        .unwrap();
    harness.chat(1, "question").await.unwrap();
    harness.mock_provider.add_failure("timeout").await;

    harness.press(1, ButtonAction::Retry).await;

    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].assistant_text, "draft");
}

#[tokio::test]
async fn test_retry_with_empty_history() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.send_message(1, "/retry").await;
    assert!(sent_contains(&harness, notices::NOTHING_TO_RETRY).await);
    assert_eq!(harness.mock_provider.calls(), 0);
}

#[tokio::test]
async fn test_new_command_starts_an_empty_dialog() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.chat(1, "hello").await.unwrap();

    harness.send_message(1, "/new").await;
    assert!(harness.turns(1).await.unwrap().is_empty());
    assert!(sent_contains(&harness, notices::NEW_DIALOG).await);
}

#[tokio::test]
async fn test_persona_button_switches_mode_and_dialog() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.chat(1, "hello").await.unwrap();

    harness
        .press(1, ButtonAction::SetPersona(PersonaId::CodeAssistant))
        .await;

    let account = harness.account(1).await.unwrap();
    assert_eq!(account.persona(), PersonaId::CodeAssistant);
    assert!(harness.turns(1).await.unwrap().is_empty());
    assert!(sent_contains(&harness, persona(PersonaId::CodeAssistant).welcome).await);

    harness.chat(1, "fix my loop").await.unwrap();
    let requests = harness.mock_provider.requests().await;
    assert_eq!(
        requests[1].messages[0].content,
        persona(PersonaId::CodeAssistant).system_prompt
    );
}

// ---- Streaming delivery ----

#[tokio::test]
async fn test_streaming_sends_then_edits_in_place() {
    let harness = TestHarness::builder().streaming(true).build().await.unwrap();
    harness.mock_provider.add_response("hello world", Some(10)).await;

    assert_eq!(harness.chat(1, "greet").await.unwrap(), TurnState::Done);

    let sent = harness.mock_channel.sent_texts().await;
    assert_eq!(sent, vec!["hello"]);
    let edits = harness.mock_channel.edits().await;
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].text, "hello world");
    assert_eq!(harness.account(1).await.unwrap().total_used(), 10);
}

#[tokio::test]
async fn test_streaming_without_edit_support_sends_once() {
    let harness = TestHarness::builder()
        .streaming(true)
        .with_channel(MockChannel::without_edit())
        .build()
        .await
        .unwrap();
    harness.mock_provider.add_response("hello world", Some(10)).await;

    harness.chat(1, "greet").await.unwrap();
    assert_eq!(harness.mock_channel.sent_texts().await, vec!["hello world"]);
    assert!(harness.mock_channel.edits().await.is_empty());
}

// ---- Side-flows ----

#[tokio::test]
async fn test_image_request_charges_fixed_cost() {
    let harness = TestHarness::builder().build().await.unwrap();
    let image_prefix = harness.config.triggers.image_prefix.clone();

    harness
        .send_message(1, &format!("{image_prefix} a red fox"))
        .await;

    let photos = harness.mock_channel.photos().await;
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].caption.as_deref(), Some("a red fox"));

    let account = harness.account(1).await.unwrap();
    let cost = harness.config.billing.image_cost_tokens;
    assert_eq!(account.balance(), harness.config.billing.initial_balance - cost);
    assert!(harness.turns(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_image_is_not_charged() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .mock_provider
        .add_image(Err("content policy".into()))
        .await;
    let image_prefix = harness.config.triggers.image_prefix.clone();

    harness.send_message(1, &format!("{image_prefix} anything")).await;
    assert!(harness.mock_channel.photos().await.is_empty());
    assert_eq!(harness.account(1).await.unwrap().total_used(), 0);
}

#[tokio::test]
async fn test_voice_note_is_transcribed_charged_and_answered() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .mock_provider
        .add_transcription(Ok("what time is it".into()))
        .await;
    harness.mock_provider.add_response("noon", Some(20)).await;

    harness.send_voice(1, 10).await;

    assert!(sent_contains(&harness, "🎤: <i>what time is it</i>").await);
    assert!(sent_contains(&harness, "noon").await);
    let turns = harness.turns(1).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "what time is it");

    // 10 s at $0.006/min against $0.002 per 1000 tokens is 500 tokens.
    let account = harness.account(1).await.unwrap();
    assert_eq!(account.total_used(), 520);
    let summary = harness.storage.usage_summary(account.id()).await.unwrap();
    assert!(summary.contains(&(UsageKind::Transcription, 500)));
    assert!(summary.contains(&(UsageKind::Chat, 20)));
}

#[tokio::test]
async fn test_speak_replies_with_voice_outside_the_dialog() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .mock_provider
        .add_response("Once upon a time", Some(25))
        .await;
    let speak_prefix = harness.config.triggers.speak_prefix.clone();

    harness
        .send_message(1, &format!("{speak_prefix} a short story"))
        .await;

    let voices = harness.mock_channel.voices().await;
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].data, b"Once upon a time".to_vec());
    assert!(harness.turns(1).await.unwrap().is_empty());
    assert_eq!(harness.account(1).await.unwrap().total_used(), 25);
}

#[tokio::test]
async fn test_speak_refuses_markup_answers() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.mock_provider.add_response("<b>bold</b>", Some(25)).await;
    let speak_prefix = harness.config.triggers.speak_prefix.clone();

    harness.send_message(1, &format!("{speak_prefix} anything")).await;

    assert!(harness.mock_channel.voices().await.is_empty());
    assert!(sent_contains(&harness, notices::SPEAK_REFUSED).await);
}

#[tokio::test]
async fn test_edited_messages_get_a_notice() {
    let harness = TestHarness::builder().build().await.unwrap();
    let msg = harness.inbound(1, InboundContent::Edited);
    harness.pipeline.handle(msg).await;
    assert!(sent_contains(&harness, notices::EDITING_UNSUPPORTED).await);
}

// ---- Payments and balance ----

#[tokio::test]
async fn test_payment_credits_package_and_marks_paying() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 5).await.unwrap();
    let payload = harness.config.billing.package.payload.clone();

    harness.pay(1, &payload).await;

    let account = harness.account(1).await.unwrap();
    assert_eq!(account.balance(), 5 + harness.config.billing.package.tokens);
    assert!(account.is_paying());
    assert!(sent_contains(&harness, "Thank you for your purchase").await);
}

#[tokio::test]
async fn test_payment_with_unknown_payload_is_ignored() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_user(1, 5).await.unwrap();

    harness.pay(1, "forged").await;

    let account = harness.account(1).await.unwrap();
    assert_eq!(account.balance(), 5);
    assert!(!account.is_paying());
}

#[tokio::test]
async fn test_buy_sends_an_invoice() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.send_message(1, "/buy").await;

    let invoices = harness.mock_channel.invoices().await;
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].chat_id, ChatId(1));
    assert_eq!(invoices[0].payload, harness.config.billing.package.payload);
}

#[tokio::test]
async fn test_balance_refreshes_stale_exchange_rate() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.send_message(1, "/balance").await;

    assert_eq!(harness.mock_rates.calls(), 1);
    assert_eq!(harness.account(1).await.unwrap().fx_quote().rate, 90.0);
    assert!(sent_contains(&harness, "1 USD = 90.00").await);

    // A fresh quote is reused.
    harness.send_message(1, "/balance").await;
    assert_eq!(harness.mock_rates.calls(), 1);
}

// ---- Administration ----

async fn admin_harness() -> TestHarness {
    TestHarness::builder()
        .with_config(|c| c.billing.admin_ids = vec![1])
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_admin_commands_are_refused_for_regular_users() {
    let harness = admin_harness().await;
    harness.send_message(2, "/users").await;
    assert!(sent_contains(&harness, notices::ADMIN_ONLY).await);
    assert!(harness.mock_channel.documents().await.is_empty());
}

#[tokio::test]
async fn test_users_export_lists_every_account() {
    let harness = admin_harness().await;
    harness.seed_user(2, 10).await.unwrap();
    harness.seed_user(3, 20).await.unwrap();

    harness.send_message(1, "/users").await;

    let documents = harness.mock_channel.documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].file_name, "users.csv");
    let csv = String::from_utf8(documents[0].data.clone()).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn test_add_and_reset_adjust_balances() {
    let harness = admin_harness().await;
    harness.seed_user(2, 10).await.unwrap();

    harness.send_message(1, "/add 2 500").await;
    assert_eq!(harness.account(2).await.unwrap().balance(), 510);

    harness.send_message(1, "/reset 2").await;
    assert_eq!(
        harness.account(2).await.unwrap().balance(),
        harness.config.billing.initial_balance
    );

    harness.send_message(1, "/add 99 5").await;
    assert!(sent_contains(&harness, "User 99 not found.").await);
}

#[tokio::test]
async fn test_delete_removes_the_account() {
    let harness = admin_harness().await;
    harness.seed_user(2, 10).await.unwrap();

    harness.send_message(1, "/delete 2").await;
    assert!(harness.storage.get_user(parley_core::types::UserId(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_broadcast_counts_failed_deliveries() {
    let harness = admin_harness().await;
    harness.seed_user(2, 10).await.unwrap();
    harness.seed_user(3, 10).await.unwrap();
    harness.mock_channel.fail_chat(ChatId(3)).await;

    harness.send_message(1, "/broadcast Maintenance at 9").await;

    assert!(sent_contains(&harness, "2 delivered, 1 failed").await);
}

#[tokio::test]
async fn test_refill_raises_low_balances_only() {
    let harness = admin_harness().await;
    let floor = harness.config.billing.refill_floor;
    harness.seed_user(2, 5).await.unwrap();
    harness.seed_user(3, floor + 1000).await.unwrap();

    harness.send_message(1, "/refill").await;

    assert_eq!(harness.account(2).await.unwrap().balance(), floor);
    assert_eq!(harness.account(3).await.unwrap().balance(), floor + 1000);
    assert!(sent_contains(&harness, "Refilled 1 account(s).").await);
}

#[tokio::test]
async fn test_refill_scheduler_computes_next_run() {
    let harness = TestHarness::builder().build().await.unwrap();
    let scheduler = RefillScheduler::new(harness.pipeline.clone(), "0 7 * * *").unwrap();

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    assert_eq!(
        scheduler.next_run(now),
        Some(Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap())
    );
    assert!(RefillScheduler::new(harness.pipeline.clone(), "not a cron").is_err());
}

// ---- Agent loop ----

#[tokio::test]
async fn test_agent_loop_handles_events_until_channel_closes() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["from the loop".into()])
        .build()
        .await
        .unwrap();

    let msg = harness.inbound(1, InboundContent::Text("hello".into()));
    harness.mock_channel.inject_message(msg).await;
    harness.mock_channel.close();

    let agent = AgentLoop::new(
        harness.mock_channel.clone() as Arc<dyn ChannelAdapter>,
        harness.storage.clone() as Arc<dyn StorageAdapter>,
        harness.pipeline.clone(),
    );
    tokio::time::timeout(Duration::from_secs(5), agent.run(CancellationToken::new()))
        .await
        .expect("loop stops when the channel closes")
        .unwrap();

    assert!(sent_contains(&harness, "from the loop").await);
}

#[tokio::test]
async fn test_agent_loop_stops_on_cancellation() {
    let harness = TestHarness::builder().build().await.unwrap();
    let agent = AgentLoop::new(
        harness.mock_channel.clone() as Arc<dyn ChannelAdapter>,
        harness.storage.clone() as Arc<dyn StorageAdapter>,
        harness.pipeline.clone(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), agent.run(cancel))
        .await
        .expect("loop stops on cancel")
        .unwrap();
}
