#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use uuid::Uuid;

use sahay_core::llm::gateway::{
    GenerationRequest, GenerationResponse, LlmGateway, LlmGatewayError, LlmGatewayFuture,
};
use sahay_core::llm::moderation::{
    ModerationError, ModerationFuture, ModerationGateway, ModerationOutcome,
};
use sahay_core::models::{ReviewRecord, Summary, Turn};
use sahay_core::store::{
    AppendOutcome, MemoryStore, ReviewStore, StoreError, StoreFuture, SummaryInsertOutcome,
};

/// Gateway double that pops a scripted reply per call and records every
/// request it saw. An exhausted script is a provider failure.
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, LlmGatewayError>>>,
    seen: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGateway {
    pub fn with_replies(replies: Vec<Result<String, LlmGatewayError>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_texts(texts: &[&str]) -> Self {
        Self::with_replies(texts.iter().map(|text| Ok((*text).to_string())).collect())
    }

    pub fn seen_requests(&self) -> Vec<GenerationRequest> {
        self.seen.lock().expect("seen lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("seen lock").len()
    }
}

impl LlmGateway for ScriptedGateway {
    fn generate<'a>(&'a self, request: GenerationRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.seen.lock().expect("seen lock").push(request);

            let reply = self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Err(LlmGatewayError::ProviderFailure(
                    "scripted replies exhausted".to_string(),
                )))?;

            Ok(GenerationResponse {
                model: "scripted-model".to_string(),
                provider_request_id: None,
                text: reply,
                usage: None,
            })
        })
    }
}

/// Moderation double. An exhausted script returns a clean outcome.
pub struct ScriptedModeration {
    replies: Mutex<VecDeque<Result<ModerationOutcome, ModerationError>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedModeration {
    pub fn with_replies(replies: Vec<Result<ModerationOutcome, ModerationError>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_clean() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl ModerationGateway for ScriptedModeration {
    fn moderate<'a>(&'a self, text: &'a str) -> ModerationFuture<'a> {
        Box::pin(async move {
            self.seen.lock().expect("seen lock").push(text.to_string());

            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Ok(ModerationOutcome::default()))
        })
    }
}

/// Moderation double that never answers within any realistic deadline.
pub struct SleepyModeration;

impl ModerationGateway for SleepyModeration {
    fn moderate<'a>(&'a self, _text: &'a str) -> ModerationFuture<'a> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModerationOutcome::default())
        })
    }
}

pub fn moderation_scores(scores: &[(&str, f64)]) -> ModerationOutcome {
    ModerationOutcome {
        flagged: scores.iter().any(|(_, score)| *score >= 0.5),
        category_scores: scores
            .iter()
            .map(|(category, score)| ((*category).to_string(), *score))
            .collect(),
    }
}

/// In-memory store with the same idempotency semantics as the Postgres
/// implementation, plus a failure toggle for storage-error paths.
#[derive(Default)]
pub struct InMemoryStore {
    turns: Mutex<Vec<Turn>>,
    summaries: Mutex<Vec<Summary>>,
    reviews: Mutex<Vec<ReviewRecord>>,
    fail_appends: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn recorded_turns(&self) -> Vec<Turn> {
        self.turns.lock().expect("turns lock").clone()
    }

    pub fn stored_summaries(&self) -> Vec<Summary> {
        self.summaries.lock().expect("summaries lock").clone()
    }

    pub fn review_records(&self) -> Vec<ReviewRecord> {
        self.reviews.lock().expect("reviews lock").clone()
    }

    pub fn seed_turn(&self, turn: Turn) {
        self.turns.lock().expect("turns lock").push(turn);
    }

    pub fn seed_summary(&self, summary: Summary) {
        self.summaries.lock().expect("summaries lock").push(summary);
    }
}

impl MemoryStore for InMemoryStore {
    fn append_turn<'a>(&'a self, turn: &'a Turn) -> StoreFuture<'a, AppendOutcome> {
        Box::pin(async move {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(StoreError::InvalidData("append failure injected".to_string()));
            }

            let mut turns = self.turns.lock().expect("turns lock");
            let duplicate = turns.iter().any(|existing| {
                existing.conversation_id == turn.conversation_id
                    && existing.idempotency_key == turn.idempotency_key
            });

            if duplicate {
                Ok(AppendOutcome::Duplicate)
            } else {
                turns.push(turn.clone());
                Ok(AppendOutcome::Recorded)
            }
        })
    }

    fn turns_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        civil_date: NaiveDate,
    ) -> StoreFuture<'a, Vec<Turn>> {
        Box::pin(async move {
            let mut turns = self
                .turns
                .lock()
                .expect("turns lock")
                .iter()
                .filter(|turn| {
                    turn.conversation_id == conversation_id && turn.civil_date == civil_date
                })
                .cloned()
                .collect::<Vec<_>>();
            turns.sort_by_key(|turn| turn.recorded_at);
            Ok(turns)
        })
    }

    fn summary_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        summary_date: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>> {
        Box::pin(async move {
            Ok(self
                .summaries
                .lock()
                .expect("summaries lock")
                .iter()
                .find(|summary| {
                    summary.conversation_id == conversation_id
                        && summary.summary_date == summary_date
                })
                .cloned())
        })
    }

    fn latest_summary_before<'a>(
        &'a self,
        conversation_id: Uuid,
        before: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>> {
        Box::pin(async move {
            Ok(self
                .summaries
                .lock()
                .expect("summaries lock")
                .iter()
                .filter(|summary| {
                    summary.conversation_id == conversation_id && summary.summary_date < before
                })
                .max_by_key(|summary| summary.summary_date)
                .cloned())
        })
    }

    fn insert_summary<'a>(&'a self, summary: &'a Summary) -> StoreFuture<'a, SummaryInsertOutcome> {
        Box::pin(async move {
            let mut summaries = self.summaries.lock().expect("summaries lock");
            let exists = summaries.iter().any(|existing| {
                existing.conversation_id == summary.conversation_id
                    && existing.summary_date == summary.summary_date
            });

            if exists {
                Ok(SummaryInsertOutcome::AlreadyExists)
            } else {
                summaries.push(summary.clone());
                Ok(SummaryInsertOutcome::Inserted)
            }
        })
    }
}

impl ReviewStore for InMemoryStore {
    fn append_review_record<'a>(&'a self, record: &'a ReviewRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.reviews.lock().expect("reviews lock").push(record.clone());
            Ok(())
        })
    }
}
