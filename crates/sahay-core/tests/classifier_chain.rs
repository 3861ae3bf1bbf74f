mod support;

use std::sync::Arc;

use serde_json::json;

use sahay_core::config::CoreConfig;
use sahay_core::llm::contracts::SAFETY_JUDGMENT_VERSION_V1;
use sahay_core::llm::gateway::LlmGatewayError;
use sahay_core::llm::moderation::ModerationError;
use sahay_core::models::{Direction, RiskSource, RiskVerdict};
use sahay_core::safety::RiskClassifier;

use support::{ScriptedGateway, ScriptedModeration, SleepyModeration, moderation_scores};

fn judgment_json(category: &str, confidence: f64, severity: &str, response_needed: bool) -> String {
    json!({
        "version": SAFETY_JUDGMENT_VERSION_V1,
        "output": {
            "risk_present": category != "none",
            "category": category,
            "confidence": confidence,
            "rationale": "test rationale",
            "severity": severity,
            "response_needed": response_needed
        }
    })
    .to_string()
}

fn clean_judgment() -> String {
    judgment_json("none", 0.1, "low", false)
}

#[tokio::test]
async fn lexical_hit_blocks_even_when_every_other_source_errors() {
    let moderation = Arc::new(ScriptedModeration::with_replies(vec![Err(
        ModerationError::ProviderFailure("status=503".to_string()),
    )]));
    let gateway = Arc::new(ScriptedGateway::with_replies(vec![Err(
        LlmGatewayError::Timeout,
    )]));
    let classifier = RiskClassifier::new(
        Arc::clone(&moderation) as _,
        Arc::clone(&gateway) as _,
        CoreConfig::default(),
    );

    let classification = classifier
        .classify("I want to end it", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_blocked());
    assert_eq!(classification.verdict.source(), Some(RiskSource::Lexical));
    assert_eq!(classification.verdict.reason(), Some("crisis-keyword:SI"));
    assert!(classification.lexical.is_some());
    // Defense in depth: the other sources were still consulted.
    assert_eq!(moderation.seen_texts().len(), 1);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn lexical_block_keeps_priority_over_a_moderation_block() {
    let moderation = Arc::new(ScriptedModeration::with_replies(vec![Ok(
        moderation_scores(&[("self-harm", 0.95)]),
    )]));
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&clean_judgment()]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("I want to end it", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_blocked());
    assert_eq!(classification.verdict.source(), Some(RiskSource::Lexical));
    assert_eq!(
        classification.fired_sources(),
        vec![RiskSource::Lexical, RiskSource::Moderation]
    );
}

#[tokio::test]
async fn moderation_blocks_on_self_harm_family_scores() {
    let moderation = Arc::new(ScriptedModeration::with_replies(vec![Ok(
        moderation_scores(&[("self-harm/intent", 0.8), ("violence", 0.1)]),
    )]));
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&clean_judgment()]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("a message moderation dislikes", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_blocked());
    assert_eq!(
        classification.verdict.reason(),
        Some("moderation:self-harm/intent")
    );
    assert_eq!(classification.verdict.source(), Some(RiskSource::Moderation));
}

#[tokio::test]
async fn moderation_failure_degrades_to_clear() {
    let moderation = Arc::new(ScriptedModeration::with_replies(vec![Err(
        ModerationError::ProviderFailure("status=500".to_string()),
    )]));
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&clean_judgment()]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("an ordinary message", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_clear());
    assert!(classification.sources.is_empty());
}

#[tokio::test]
async fn moderation_timeout_degrades_to_clear() {
    let mut config = CoreConfig::default();
    config.moderation_timeout_ms = 50;

    let gateway = Arc::new(ScriptedGateway::with_texts(&[&clean_judgment()]));
    let classifier = RiskClassifier::new(Arc::new(SleepyModeration), gateway, config);

    let classification = classifier
        .classify("an ordinary message", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_clear());
}

#[tokio::test]
async fn confident_judgment_flags_but_never_blocks() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&judgment_json(
        "distress", 0.85, "medium", true,
    )]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("everything feels pointless lately", Direction::Inbound)
        .await;

    let RiskVerdict::Flagged { reason, source, .. } = &classification.verdict else {
        panic!("expected a flag, got {:?}", classification.verdict);
    };
    assert_eq!(reason, "judgment:distress");
    assert_eq!(*source, RiskSource::Judgment);
}

#[tokio::test]
async fn judgment_below_threshold_stays_clear() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&judgment_json(
        "distress", 0.5, "low", true,
    )]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("rough week honestly", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_clear());
}

#[tokio::test]
async fn abuse_judgments_use_the_lower_confidence_bar() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&judgment_json(
        "abuse", 0.65, "high", true,
    )]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("things at home are bad", Direction::Inbound)
        .await;

    assert_eq!(classification.verdict.reason(), Some("judgment:abuse"));
}

#[tokio::test]
async fn malformed_judgment_output_is_dropped() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_texts(&["not json at all"]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("an ordinary message", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_clear());
    assert!(classification.sources.is_empty());
}

#[tokio::test]
async fn judgment_failure_degrades_to_absent_source() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_replies(vec![Err(
        LlmGatewayError::Timeout,
    )]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("an ordinary message", Direction::Inbound)
        .await;

    assert!(classification.verdict.is_clear());
}

#[tokio::test]
async fn outbound_text_skips_lexical_and_judgment_sources() {
    let moderation = Arc::new(ScriptedModeration::always_clean());
    let gateway = Arc::new(ScriptedGateway::with_texts(&[]));
    let classifier = RiskClassifier::new(
        moderation,
        Arc::clone(&gateway) as _,
        CoreConfig::default(),
    );

    // Crisis vocabulary in generated text is moderation's job, not the
    // inbound keyword matcher's.
    let classification = classifier
        .classify("I want to end it", Direction::Outbound)
        .await;

    assert!(classification.verdict.is_clear());
    assert!(classification.lexical.is_none());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn moderation_outranks_judgment_at_equal_rank() {
    let moderation = Arc::new(ScriptedModeration::with_replies(vec![Ok(
        moderation_scores(&[("violence", 0.8)]),
    )]));
    let gateway = Arc::new(ScriptedGateway::with_texts(&[&judgment_json(
        "crisis", 0.9, "high", true,
    )]));
    let classifier = RiskClassifier::new(moderation, gateway, CoreConfig::default());

    let classification = classifier
        .classify("a message both sources dislike", Direction::Inbound)
        .await;

    assert_eq!(classification.verdict.source(), Some(RiskSource::Moderation));
    assert_eq!(
        classification.fired_sources(),
        vec![RiskSource::Moderation, RiskSource::Judgment]
    );
}
