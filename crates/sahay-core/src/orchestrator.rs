use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::escalation::ReviewSink;
use crate::llm::gateway::{ChatMessage, GenerationRequest, LlmGateway, LlmGatewayError};
use crate::llm::prompts::companion_system_prompt;
use crate::memory::{MemoryContext, MemoryManager, SummarizeOutcome};
use crate::models::{
    Direction, ReviewRecord, RiskSource, RiskVerdict, Turn, turn_idempotency_key,
};
use crate::safety::{Classification, RiskClassifier, crisis_response, generic_safety_response};
use crate::shaper::{self, ShaperError, regeneration_feedback};
use crate::store::StoreError;
use crate::timezone;

const ESCALATION_EXCERPT_CHARS: usize = 200;

/// Lifecycle of one turn, in tracing. Every turn moves strictly forward
/// through these phases; a blocked input jumps from InputChecked to Recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    InputChecked,
    Blocked,
    Generating,
    Shaped,
    OutputChecked,
    Recorded,
    Done,
}

impl TurnPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::InputChecked => "input_checked",
            Self::Blocked => "blocked",
            Self::Generating => "generating",
            Self::Shaped => "shaped",
            Self::OutputChecked => "output_checked",
            Self::Recorded => "recorded",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: Uuid,
    /// Caller-supplied message identity; retried deliveries reuse it.
    pub client_message_id: String,
    pub user_text: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: String,
    /// Worst verdict across the inbound and outbound checks.
    pub verdict: RiskVerdict,
    pub fired_sources: Vec<RiskSource>,
    /// False when the reply still violates the style contract after the
    /// full regeneration budget.
    pub style_satisfied: bool,
    pub summarized: bool,
}

#[derive(Debug, Error)]
pub enum TurnError {
    /// Generation failed and no candidate exists; `fallback_text` is safe
    /// to show the user in place of a reply.
    #[error("response generation failed: {source}")]
    Generation {
        fallback_text: String,
        source: LlmGatewayError,
    },
    /// The reply was produced but could not be durably recorded. The text
    /// is carried so the caller can decide whether to deliver it anyway.
    #[error("turn could not be recorded: {source}")]
    Storage {
        response_text: String,
        source: StoreError,
    },
}

/// Drives one user message through safety checks, generation, shaping,
/// recording, and opportunistic summarization.
pub struct Orchestrator {
    classifier: RiskClassifier,
    memory: MemoryManager,
    gateway: Arc<dyn LlmGateway>,
    review: Arc<dyn ReviewSink>,
    config: CoreConfig,
    reference_tz: Tz,
}

impl Orchestrator {
    pub fn new(
        classifier: RiskClassifier,
        memory: MemoryManager,
        gateway: Arc<dyn LlmGateway>,
        review: Arc<dyn ReviewSink>,
        config: CoreConfig,
    ) -> Self {
        let reference_tz = timezone::parse_time_zone_or_default(&config.reference_time_zone);
        Self {
            classifier,
            memory,
            gateway,
            review,
            config,
            reference_tz,
        }
    }

    pub async fn process_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, TurnError> {
        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Received.as_str(),
            "processing turn"
        );

        let input = self
            .classifier
            .classify(&request.user_text, Direction::Inbound)
            .await;
        self.escalate_sources(request, &input, Direction::Inbound, &request.user_text)
            .await;
        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::InputChecked.as_str(),
            verdict_rank = input.verdict.rank(),
            "input classified"
        );

        if input.verdict.is_blocked() {
            return self.finish_blocked_turn(request, input).await;
        }

        let (final_text, style_satisfied, output) = self.generate_reply(request).await?;

        let mut fired_sources = input.fired_sources();
        for source in output.fired_sources() {
            if !fired_sources.contains(&source) {
                fired_sources.push(source);
            }
        }
        let verdict = RiskVerdict::combine([input.verdict, output.verdict]);

        let summarized = self
            .record_and_summarize(request, &final_text, verdict.clone(), fired_sources.clone())
            .await?;

        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Done.as_str(),
            style_satisfied,
            "turn complete"
        );

        Ok(TurnOutcome {
            final_text,
            verdict,
            fired_sources,
            style_satisfied,
            summarized,
        })
    }

    /// Blocked input short-circuits generation entirely: the reply is the
    /// fixed crisis text for the matched category, and the turn is still
    /// recorded so the day window reflects what happened.
    async fn finish_blocked_turn(
        &self,
        request: &TurnRequest,
        input: Classification,
    ) -> Result<TurnOutcome, TurnError> {
        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Blocked.as_str(),
            reason = input.verdict.reason(),
            "input blocked, skipping generation"
        );

        let final_text = match &input.lexical {
            Some(hit) => crisis_response(hit.category).to_string(),
            None => generic_safety_response().to_string(),
        };

        let fired_sources = input.fired_sources();
        let summarized = self
            .record_and_summarize(request, &final_text, input.verdict.clone(), fired_sources.clone())
            .await?;

        Ok(TurnOutcome {
            final_text,
            verdict: input.verdict,
            fired_sources,
            style_satisfied: true,
            summarized,
        })
    }

    async fn generate_reply(
        &self,
        request: &TurnRequest,
    ) -> Result<(String, bool, Classification), TurnError> {
        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Generating.as_str(),
            "generating reply"
        );

        // A context load failure degrades to an empty context; losing a
        // day's recall is recoverable, refusing to reply is not.
        let context = match self
            .memory
            .load_context(request.conversation_id, request.received_at)
            .await
        {
            Ok(context) => context,
            Err(err) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    error = %err,
                    "failed to load memory context, replying without it"
                );
                MemoryContext::default()
            }
        };

        let messages = self.conversation_messages(&context, &request.user_text);
        let first_request = GenerationRequest::chat(
            messages.clone(),
            self.config.generation_max_tokens,
            self.config.generation_temperature,
        );

        let candidate = self
            .gateway
            .generate(first_request)
            .await
            .map_err(|source| TurnError::Generation {
                fallback_text: generic_safety_response().to_string(),
                source,
            })?
            .text;

        let gateway = Arc::clone(&self.gateway);
        let style = self.config.style.clone();
        let max_tokens = self.config.generation_max_tokens;
        let base_messages = messages;
        let shaped = shaper::shape(candidate, &self.config.style, move |temperature, violations| {
            let mut retry_messages = base_messages.clone();
            retry_messages.push(ChatMessage::system(regeneration_feedback(violations, &style)));
            let gateway = Arc::clone(&gateway);
            async move {
                let response = gateway
                    .generate(GenerationRequest::chat(retry_messages, max_tokens, temperature))
                    .await?;
                Ok(response.text)
            }
        })
        .await
        .map_err(|err| match err {
            ShaperError::Generation(source) => TurnError::Generation {
                fallback_text: generic_safety_response().to_string(),
                source,
            },
        })?;

        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Shaped.as_str(),
            attempts = shaped.attempts,
            satisfied = shaped.satisfied,
            "reply shaped"
        );

        let output = self
            .classifier
            .classify(&shaped.text, Direction::Outbound)
            .await;
        self.escalate_sources(request, &output, Direction::Outbound, &shaped.text)
            .await;
        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::OutputChecked.as_str(),
            verdict_rank = output.verdict.rank(),
            "output classified"
        );

        let final_text = if output.verdict.is_blocked() {
            warn!(
                conversation_id = %request.conversation_id,
                reason = output.verdict.reason(),
                "generated reply blocked, substituting safety text"
            );
            generic_safety_response().to_string()
        } else {
            shaped.text
        };

        Ok((final_text, shaped.satisfied, output))
    }

    fn conversation_messages(
        &self,
        context: &MemoryContext,
        user_text: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(companion_system_prompt(&self.config.style))];

        if let Some(summary) = &context.latest_summary {
            let mut recall = format!("What you remember from {}:\n", summary.summary_date);
            for (label, field) in [
                ("Main concerns", &summary.main_concerns),
                ("Emotional patterns", &summary.emotional_patterns),
                ("Coping strategies", &summary.coping_strategies),
                ("Progress notes", &summary.progress_notes),
                ("Important context", &summary.important_context),
            ] {
                if let Some(value) = field {
                    recall.push_str(label);
                    recall.push_str(": ");
                    recall.push_str(value);
                    recall.push('\n');
                }
            }
            messages.push(ChatMessage::system(recall));
        }

        for turn in &context.todays_turns {
            messages.push(ChatMessage::user(turn.user_text.clone()));
            messages.push(ChatMessage::assistant(turn.assistant_text.clone()));
        }

        messages.push(ChatMessage::user(user_text.to_string()));
        messages
    }

    async fn record_and_summarize(
        &self,
        request: &TurnRequest,
        final_text: &str,
        verdict: RiskVerdict,
        fired_sources: Vec<RiskSource>,
    ) -> Result<bool, TurnError> {
        let turn = Turn {
            conversation_id: request.conversation_id,
            idempotency_key: turn_idempotency_key(
                request.conversation_id,
                &request.client_message_id,
            ),
            recorded_at: request.received_at,
            civil_date: timezone::civil_date(request.received_at, self.reference_tz),
            user_text: request.user_text.clone(),
            assistant_text: final_text.to_string(),
            verdict,
            fired_sources,
        };

        self.memory
            .record_turn(&turn)
            .await
            .map_err(|source| TurnError::Storage {
                response_text: final_text.to_string(),
                source,
            })?;

        info!(
            conversation_id = %request.conversation_id,
            phase = TurnPhase::Recorded.as_str(),
            civil_date = %turn.civil_date,
            "turn recorded"
        );

        // Summarization is opportunistic; its failure never fails the turn.
        match self
            .memory
            .maybe_summarize(request.conversation_id, request.received_at)
            .await
        {
            Ok(SummarizeOutcome::Generated(_)) => Ok(true),
            Ok(_) => Ok(false),
            Err(err) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    error = %err,
                    "summarization failed, continuing"
                );
                Ok(false)
            }
        }
    }

    async fn escalate_sources(
        &self,
        request: &TurnRequest,
        classification: &Classification,
        direction: Direction,
        text: &str,
    ) {
        for report in &classification.sources {
            let Some(reason) = report.verdict.reason() else {
                continue;
            };

            let severity = match &report.verdict {
                RiskVerdict::Flagged { severity, .. } => Some(*severity),
                _ => None,
            };

            let record = ReviewRecord {
                conversation_id: request.conversation_id,
                direction,
                source: report.source,
                reason: reason.to_string(),
                severity,
                excerpt: excerpt(text),
                observed_at: request.received_at,
            };

            self.review.escalate(&record).await;
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= ESCALATION_EXCERPT_CHARS {
        return text.to_string();
    }
    text.chars().take(ESCALATION_EXCERPT_CHARS).collect()
}
