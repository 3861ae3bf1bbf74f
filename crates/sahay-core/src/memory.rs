use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::llm::contracts::{StructuredCapability, StructuredOutputContract};
use crate::llm::gateway::{ChatMessage, GenerationRequest, LlmGateway, LlmGatewayError};
use crate::llm::prompts::template_for_capability;
use crate::llm::validation::{OutputValidationError, validate_output_json};
use crate::models::{Summary, Turn};
use crate::store::{AppendOutcome, MemoryStore, StoreError, SummaryInsertOutcome};
use crate::timezone;

const SUMMARY_TEMPERATURE: f32 = 0.3;

/// Everything the generator gets to see about a conversation: the current
/// reference-day transcript plus the most recent prior daily summary.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub todays_turns: Vec<Turn>,
    pub latest_summary: Option<Summary>,
}

#[derive(Debug, Clone)]
pub enum SummarizeOutcome {
    Generated(Summary),
    AlreadySummarized,
    BelowThreshold { turns: usize, required: usize },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("summary generation failed: {0}")]
    Generation(#[from] LlmGatewayError),
    #[error("summary output failed validation: {0}")]
    InvalidSummary(#[from] OutputValidationError),
}

/// Day-scoped conversation memory. All day boundaries use the reference
/// civil timezone, so "today" is the same day for the recorder and the
/// summarizer no matter where either process runs.
pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    gateway: Arc<dyn LlmGateway>,
    reference_tz: Tz,
    min_turns_for_summary: usize,
    summary_max_tokens: u32,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        gateway: Arc<dyn LlmGateway>,
        reference_tz: Tz,
        min_turns_for_summary: usize,
        summary_max_tokens: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            reference_tz,
            min_turns_for_summary,
            summary_max_tokens,
        }
    }

    pub async fn load_context(
        &self,
        conversation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MemoryContext, MemoryError> {
        let today = timezone::civil_date(now, self.reference_tz);

        let todays_turns = self.store.turns_for_day(conversation_id, today).await?;
        let latest_summary = self
            .store
            .latest_summary_before(conversation_id, today)
            .await?;

        Ok(MemoryContext {
            todays_turns,
            latest_summary,
        })
    }

    /// Idempotent: appending an already-recorded turn is a no-op duplicate.
    pub async fn record_turn(&self, turn: &Turn) -> Result<AppendOutcome, StoreError> {
        self.store.append_turn(turn).await
    }

    /// Summarize today's window if it is large enough and not yet
    /// summarized. The durable uniqueness check makes concurrent callers
    /// safe: exactly one insert wins, the rest observe `AlreadySummarized`.
    pub async fn maybe_summarize(
        &self,
        conversation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SummarizeOutcome, MemoryError> {
        let today = timezone::civil_date(now, self.reference_tz);

        if self
            .store
            .summary_for_day(conversation_id, today)
            .await?
            .is_some()
        {
            return Ok(SummarizeOutcome::AlreadySummarized);
        }

        let turns = self.store.turns_for_day(conversation_id, today).await?;
        if turns.len() < self.min_turns_for_summary {
            return Ok(SummarizeOutcome::BelowThreshold {
                turns: turns.len(),
                required: self.min_turns_for_summary,
            });
        }

        let previous = self
            .store
            .latest_summary_before(conversation_id, today)
            .await?;

        let template = template_for_capability(StructuredCapability::DailySummary);
        let schema_prompt = format!(
            "{}\n\nReturn JSON with version \"{}\" matching this schema:\n{}",
            template.context_prompt, template.contract_version, template.output_schema
        );

        let request = GenerationRequest::structured(
            vec![
                ChatMessage::system(template.system_prompt),
                ChatMessage::system(schema_prompt),
                ChatMessage::user(summary_input(&turns, previous.as_ref())),
            ],
            self.summary_max_tokens,
            SUMMARY_TEMPERATURE,
        );

        let response = self.gateway.generate(request).await?;
        let StructuredOutputContract::DailySummary(contract) =
            validate_output_json(StructuredCapability::DailySummary, &response.text)?
        else {
            return Err(MemoryError::InvalidSummary(
                OutputValidationError::SchemaViolation {
                    capability: StructuredCapability::DailySummary,
                    errors: vec!["unexpected contract shape".to_string()],
                },
            ));
        };

        let output = contract.output;
        let summary = Summary {
            conversation_id,
            summary_date: today,
            main_concerns: output.main_concerns,
            emotional_patterns: output.emotional_patterns,
            coping_strategies: output.coping_strategies,
            progress_notes: output.progress_notes,
            important_context: output.important_context,
            source_turn_count: turns.len() as u32,
            created_at: now,
        };

        match self.store.insert_summary(&summary).await? {
            SummaryInsertOutcome::Inserted => {
                info!(%conversation_id, summary_date = %today, turns = turns.len(), "generated daily summary");
                Ok(SummarizeOutcome::Generated(summary))
            }
            SummaryInsertOutcome::AlreadyExists => Ok(SummarizeOutcome::AlreadySummarized),
        }
    }
}

/// Transcript plus the carried-over summary, in the order the summarizer
/// reads them: history first, then today.
fn summary_input(turns: &[Turn], previous: Option<&Summary>) -> String {
    let mut input = String::new();

    if let Some(previous) = previous {
        let _ = writeln!(input, "Previous summary ({}):", previous.summary_date);
        for (label, field) in [
            ("Main concerns", &previous.main_concerns),
            ("Emotional patterns", &previous.emotional_patterns),
            ("Coping strategies", &previous.coping_strategies),
            ("Progress notes", &previous.progress_notes),
            ("Important context", &previous.important_context),
        ] {
            if let Some(value) = field {
                let _ = writeln!(input, "{label}: {value}");
            }
        }
        input.push('\n');
    }

    input.push_str("Today's conversation:\n");
    for turn in turns {
        let _ = writeln!(input, "USER: {}", turn.user_text);
        let _ = writeln!(input, "ASSISTANT: {}", turn.assistant_text);
    }

    input
}
