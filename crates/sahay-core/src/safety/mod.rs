pub mod crisis;
pub mod lexical;

pub use crisis::{crisis_response, generic_safety_response};
pub use lexical::{LexicalMatch, scan};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::config::CoreConfig;
use crate::llm::contracts::{JudgmentCategory, StructuredCapability, StructuredOutputContract};
use crate::llm::gateway::{ChatMessage, GenerationRequest, LlmGateway};
use crate::llm::moderation::{ModerationGateway, ModerationOutcome};
use crate::llm::prompts::template_for_capability;
use crate::llm::validation::validate_output_json;
use crate::models::{Direction, RiskSeverity, RiskSource, RiskVerdict};

const JUDGMENT_MAX_TOKENS: u32 = 300;
const MODERATION_SEVERE_SCORE: f64 = 0.9;

/// Verdict one source produced, kept alongside the combined verdict so the
/// caller can escalate every source that fired, not just the winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: RiskSource,
    pub verdict: RiskVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: RiskVerdict,
    /// Non-clear per-source verdicts in priority order.
    pub sources: Vec<SourceReport>,
    pub lexical: Option<LexicalMatch>,
}

impl Classification {
    pub fn fired_sources(&self) -> Vec<RiskSource> {
        self.sources.iter().map(|report| report.source).collect()
    }
}

/// Chains the three risk sources over one piece of text. Lexical matching is
/// synchronous and inbound-only; moderation covers both directions; the
/// model-based judgment is inbound-only and advisory. Source failures always
/// degrade toward Clear, never toward Blocked.
pub struct RiskClassifier {
    moderation: Arc<dyn ModerationGateway>,
    judgment: Arc<dyn LlmGateway>,
    config: CoreConfig,
}

impl RiskClassifier {
    pub fn new(
        moderation: Arc<dyn ModerationGateway>,
        judgment: Arc<dyn LlmGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            moderation,
            judgment,
            config,
        }
    }

    pub async fn classify(&self, text: &str, direction: Direction) -> Classification {
        let lexical = match direction {
            Direction::Inbound => lexical::scan(text),
            Direction::Outbound => None,
        };

        // Defense in depth: every applicable source runs, even when the
        // lexical matcher has already decided the verdict.
        let (moderation_verdict, judgment_verdict) =
            tokio::join!(self.moderation_verdict(text), self.judgment_verdict(text, direction));

        let mut sources = Vec::new();
        if let Some(hit) = &lexical {
            sources.push(SourceReport {
                source: RiskSource::Lexical,
                verdict: RiskVerdict::Blocked {
                    reason: format!("crisis-keyword:{}", hit.category.code()),
                    source: RiskSource::Lexical,
                },
            });
        }
        if let Some(verdict) = moderation_verdict
            && !verdict.is_clear()
        {
            sources.push(SourceReport {
                source: RiskSource::Moderation,
                verdict,
            });
        }
        if let Some(verdict) = judgment_verdict
            && !verdict.is_clear()
        {
            sources.push(SourceReport {
                source: RiskSource::Judgment,
                verdict,
            });
        }

        let verdict = RiskVerdict::combine(sources.iter().map(|report| report.verdict.clone()));

        Classification {
            verdict,
            sources,
            lexical,
        }
    }

    async fn moderation_verdict(&self, text: &str) -> Option<RiskVerdict> {
        let deadline = Duration::from_millis(self.config.moderation_timeout_ms);
        let outcome = match timeout(deadline, self.moderation.moderate(text)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(error = %err, "moderation source unavailable, treating text as clear");
                return Some(RiskVerdict::Clear);
            }
            Err(_) => {
                warn!(timeout_ms = self.config.moderation_timeout_ms, "moderation source timed out, treating text as clear");
                return Some(RiskVerdict::Clear);
            }
        };

        Some(self.threshold_moderation(&outcome))
    }

    fn threshold_moderation(&self, outcome: &ModerationOutcome) -> RiskVerdict {
        let blocking_hit = outcome
            .category_scores
            .iter()
            .filter(|(category, score)| {
                self.config
                    .moderation_block_categories
                    .iter()
                    .any(|blocked| blocked == *category)
                    && **score >= self.config.moderation_block_threshold
            })
            .max_by(|a, b| a.1.total_cmp(b.1));

        if let Some((category, _score)) = blocking_hit {
            return RiskVerdict::Blocked {
                reason: format!("moderation:{category}"),
                source: RiskSource::Moderation,
            };
        }

        let flagging_hit = outcome
            .category_scores
            .iter()
            .filter(|(category, score)| {
                !self
                    .config
                    .moderation_block_categories
                    .iter()
                    .any(|blocked| blocked == *category)
                    && **score >= self.config.moderation_flag_threshold
            })
            .max_by(|a, b| a.1.total_cmp(b.1));

        if let Some((category, score)) = flagging_hit {
            let severity = if *score >= MODERATION_SEVERE_SCORE {
                RiskSeverity::High
            } else {
                RiskSeverity::Medium
            };
            return RiskVerdict::Flagged {
                reason: format!("moderation:{category}"),
                severity,
                source: RiskSource::Moderation,
            };
        }

        RiskVerdict::Clear
    }

    /// Model-based second opinion on the user's message. Outbound text is
    /// never judged, and any failure degrades to an absent source.
    async fn judgment_verdict(&self, text: &str, direction: Direction) -> Option<RiskVerdict> {
        if direction == Direction::Outbound {
            return None;
        }

        let template = template_for_capability(StructuredCapability::SafetyJudgment);
        let schema_prompt = format!(
            "{}\n\nReturn JSON with version \"{}\" matching this schema:\n{}",
            template.context_prompt, template.contract_version, template.output_schema
        );

        let request = GenerationRequest::structured(
            vec![
                ChatMessage::system(template.system_prompt),
                ChatMessage::system(schema_prompt),
                ChatMessage::user(text),
            ],
            JUDGMENT_MAX_TOKENS,
            0.0,
        );

        let deadline = Duration::from_millis(self.config.judgment_timeout_ms);
        let response = match timeout(deadline, self.judgment.generate(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %err, "judgment source unavailable, continuing without it");
                return None;
            }
            Err(_) => {
                warn!(timeout_ms = self.config.judgment_timeout_ms, "judgment source timed out, continuing without it");
                return None;
            }
        };

        let contract = match validate_output_json(StructuredCapability::SafetyJudgment, &response.text)
        {
            Ok(StructuredOutputContract::SafetyJudgment(contract)) => contract,
            Ok(_) => return None,
            Err(err) => {
                warn!(error = %err, "judgment output failed validation, continuing without it");
                return None;
            }
        };

        let output = contract.output;
        if !output.risk_present
            || !output.response_needed
            || output.category == JudgmentCategory::None
        {
            return Some(RiskVerdict::Clear);
        }

        let threshold = self
            .config
            .judgment_threshold_for(output.category == JudgmentCategory::Abuse);
        if output.confidence < threshold {
            return Some(RiskVerdict::Clear);
        }

        Some(RiskVerdict::Flagged {
            reason: format!("judgment:{}", output.category.as_str()),
            severity: output.severity,
            source: RiskSource::Judgment,
        })
    }
}
