mod support;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use sahay_core::config::CoreConfig;
use sahay_core::escalation::StoreReviewSink;
use sahay_core::llm::contracts::{DAILY_SUMMARY_VERSION_V1, SAFETY_JUDGMENT_VERSION_V1};
use sahay_core::llm::gateway::LlmGatewayError;
use sahay_core::memory::MemoryManager;
use sahay_core::models::{Direction, RiskSource, RiskVerdict, Turn, turn_idempotency_key};
use sahay_core::orchestrator::{Orchestrator, TurnError, TurnRequest};
use sahay_core::safety::RiskClassifier;
use sahay_core::timezone;

use support::{InMemoryStore, ScriptedGateway, ScriptedModeration, moderation_scores};

const COMPLIANT_REPLY: &str =
    "That sounds really heavy. I'm glad you told me. What part feels hardest right now?";

fn conversation() -> Uuid {
    Uuid::from_u128(99)
}

// 14:30 IST on 2026-03-10.
fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
        .single()
        .expect("valid datetime")
}

fn request(client_message_id: &str, user_text: &str) -> TurnRequest {
    TurnRequest {
        conversation_id: conversation(),
        client_message_id: client_message_id.to_string(),
        user_text: user_text.to_string(),
        received_at: midday(),
    }
}

fn clean_judgment() -> String {
    json!({
        "version": SAFETY_JUDGMENT_VERSION_V1,
        "output": {
            "risk_present": false,
            "category": "none",
            "confidence": 0.05,
            "rationale": "ordinary content",
            "severity": "low",
            "response_needed": false
        }
    })
    .to_string()
}

fn distress_judgment() -> String {
    json!({
        "version": SAFETY_JUDGMENT_VERSION_V1,
        "output": {
            "risk_present": true,
            "category": "distress",
            "confidence": 0.85,
            "rationale": "sustained hopeless framing",
            "severity": "medium",
            "response_needed": true
        }
    })
    .to_string()
}

fn summary_json() -> String {
    json!({
        "version": DAILY_SUMMARY_VERSION_V1,
        "output": {
            "main_concerns": "exam stress",
            "emotional_patterns": null,
            "coping_strategies": null,
            "progress_notes": null,
            "important_context": null
        }
    })
    .to_string()
}

struct Harness {
    store: Arc<InMemoryStore>,
    chat: Arc<ScriptedGateway>,
    orchestrator: Orchestrator,
}

fn harness(
    chat_replies: Vec<Result<String, LlmGatewayError>>,
    judgment_replies: Vec<Result<String, LlmGatewayError>>,
    moderation: ScriptedModeration,
) -> Harness {
    let config = CoreConfig::default();
    let store = Arc::new(InMemoryStore::new());
    let chat = Arc::new(ScriptedGateway::with_replies(chat_replies));
    let judgment = Arc::new(ScriptedGateway::with_replies(judgment_replies));
    let summaries = Arc::new(ScriptedGateway::with_texts(&[&summary_json()]));

    let classifier = RiskClassifier::new(Arc::new(moderation), judgment, config.clone());
    let memory = MemoryManager::new(
        Arc::clone(&store) as _,
        summaries,
        timezone::parse_time_zone_or_default(&config.reference_time_zone),
        config.min_turns_for_summary,
        config.summary_max_tokens,
    );
    let review = Arc::new(StoreReviewSink::new(Arc::clone(&store) as _));

    let orchestrator = Orchestrator::new(
        classifier,
        memory,
        Arc::clone(&chat) as _,
        review,
        config,
    );

    Harness {
        store,
        chat,
        orchestrator,
    }
}

#[tokio::test]
async fn crisis_input_blocks_generation_and_records_the_turn() {
    let harness = harness(
        Vec::new(),
        Vec::new(),
        ScriptedModeration::always_clean(),
    );

    let outcome = harness
        .orchestrator
        .process_turn(&request("msg-001", "I want to end it"))
        .await
        .expect("blocked turn still completes");

    assert!(outcome.verdict.is_blocked());
    assert_eq!(outcome.verdict.source(), Some(RiskSource::Lexical));
    assert!(outcome.final_text.contains("AASRA"));
    assert_eq!(harness.chat.calls(), 0);

    let turns = harness.store.recorded_turns();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].verdict.is_blocked());
    assert_eq!(turns[0].assistant_text, outcome.final_text);

    let reviews = harness.store.review_records();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].source, RiskSource::Lexical);
    assert_eq!(reviews[0].direction, Direction::Inbound);
}

#[tokio::test]
async fn ordinary_turn_flows_through_to_a_recorded_reply() {
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(clean_judgment())],
        ScriptedModeration::always_clean(),
    );

    let outcome = harness
        .orchestrator
        .process_turn(&request("msg-002", "rough day at school"))
        .await
        .expect("turn should succeed");

    assert!(outcome.verdict.is_clear());
    assert!(outcome.style_satisfied);
    assert_eq!(outcome.final_text, COMPLIANT_REPLY);
    assert!(outcome.fired_sources.is_empty());

    let turns = harness.store.recorded_turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "rough day at school");
    assert_eq!(turns[0].assistant_text, COMPLIANT_REPLY);
    assert_eq!(
        turns[0].civil_date,
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date")
    );
    assert!(harness.store.review_records().is_empty());
}

#[tokio::test]
async fn redelivered_message_does_not_record_a_second_turn() {
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string()), Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(clean_judgment()), Ok(clean_judgment())],
        ScriptedModeration::always_clean(),
    );

    let request = request("msg-003", "same message, delivered twice");
    harness
        .orchestrator
        .process_turn(&request)
        .await
        .expect("first delivery");
    harness
        .orchestrator
        .process_turn(&request)
        .await
        .expect("second delivery");

    assert_eq!(harness.store.recorded_turns().len(), 1);
}

#[tokio::test]
async fn blocked_output_is_replaced_with_the_safety_text() {
    // Inbound moderation is clean; the generated reply trips it.
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(clean_judgment())],
        ScriptedModeration::with_replies(vec![
            Ok(moderation_scores(&[])),
            Ok(moderation_scores(&[("self-harm/instructions", 0.9)])),
        ]),
    );

    let outcome = harness
        .orchestrator
        .process_turn(&request("msg-004", "an ordinary message"))
        .await
        .expect("turn should complete with a replacement");

    assert!(outcome.verdict.is_blocked());
    assert_eq!(outcome.verdict.source(), Some(RiskSource::Moderation));
    assert_ne!(outcome.final_text, COMPLIANT_REPLY);
    assert!(outcome.final_text.contains("1800-599-0019"));

    let turns = harness.store.recorded_turns();
    assert_eq!(turns[0].assistant_text, outcome.final_text);

    let reviews = harness.store.review_records();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].direction, Direction::Outbound);
}

#[tokio::test]
async fn generation_failure_carries_a_fallback_and_records_nothing() {
    let harness = harness(
        vec![Err(LlmGatewayError::Timeout)],
        vec![Ok(clean_judgment())],
        ScriptedModeration::always_clean(),
    );

    let err = harness
        .orchestrator
        .process_turn(&request("msg-005", "an ordinary message"))
        .await
        .expect_err("generation failure should surface");

    let TurnError::Generation { fallback_text, source } = err else {
        panic!("expected a generation error");
    };
    assert!(matches!(source, LlmGatewayError::Timeout));
    assert!(fallback_text.contains("112"));
    assert!(harness.store.recorded_turns().is_empty());
}

#[tokio::test]
async fn storage_failure_still_hands_back_the_response_text() {
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(clean_judgment())],
        ScriptedModeration::always_clean(),
    );
    harness.store.fail_appends(true);

    let err = harness
        .orchestrator
        .process_turn(&request("msg-006", "an ordinary message"))
        .await
        .expect_err("storage failure should surface");

    let TurnError::Storage { response_text, .. } = err else {
        panic!("expected a storage error");
    };
    assert_eq!(response_text, COMPLIANT_REPLY);
}

#[tokio::test]
async fn flagged_input_still_generates_but_is_escalated() {
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(distress_judgment())],
        ScriptedModeration::always_clean(),
    );

    let outcome = harness
        .orchestrator
        .process_turn(&request("msg-007", "everything feels pointless lately"))
        .await
        .expect("flagged turn should still complete");

    assert!(matches!(outcome.verdict, RiskVerdict::Flagged { .. }));
    assert_eq!(outcome.final_text, COMPLIANT_REPLY);
    assert_eq!(outcome.fired_sources, vec![RiskSource::Judgment]);

    let reviews = harness.store.review_records();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].reason, "judgment:distress");

    let turns = harness.store.recorded_turns();
    assert!(matches!(turns[0].verdict, RiskVerdict::Flagged { .. }));
}

#[tokio::test]
async fn the_turn_that_crosses_the_threshold_triggers_a_summary() {
    let harness = harness(
        vec![Ok(COMPLIANT_REPLY.to_string())],
        vec![Ok(clean_judgment())],
        ScriptedModeration::always_clean(),
    );

    for n in 0..9 {
        harness.store.seed_turn(Turn {
            conversation_id: conversation(),
            idempotency_key: turn_idempotency_key(conversation(), &format!("seed-{n:03}")),
            recorded_at: midday() - chrono::Duration::minutes(60 - n as i64),
            civil_date: NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date"),
            user_text: format!("earlier message {n}"),
            assistant_text: format!("earlier reply {n}?"),
            verdict: RiskVerdict::Clear,
            fired_sources: Vec::new(),
        });
    }

    let outcome = harness
        .orchestrator
        .process_turn(&request("msg-008", "thanks for listening today"))
        .await
        .expect("turn should succeed");

    assert!(outcome.summarized);
    let summaries = harness.store.stored_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].source_turn_count, 10);
}
