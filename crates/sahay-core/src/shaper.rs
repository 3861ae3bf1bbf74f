use std::fmt;
use std::future::Future;

use thiserror::Error;
use tracing::debug;

use crate::config::StyleContract;
use crate::llm::gateway::LlmGatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleViolation {
    TooManyWords { count: usize, max: usize },
    TooManySentences { count: usize, max: usize },
    MissingTrailingQuestion,
}

impl fmt::Display for StyleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyWords { count, max } => {
                write!(f, "response has {count} words, the limit is {max}")
            }
            Self::TooManySentences { count, max } => {
                write!(f, "response has {count} sentences, the limit is {max}")
            }
            Self::MissingTrailingQuestion => {
                write!(f, "response does not end with a question")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaperError {
    #[error("response generation failed during shaping: {0}")]
    Generation(#[from] LlmGatewayError),
}

/// Final shaping result. `satisfied` is false when the retry budget ran out
/// with violations remaining; the text is still the last full candidate,
/// never a truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedResponse {
    pub text: String,
    /// Total generations consumed, counting the initial candidate.
    pub attempts: u32,
    pub satisfied: bool,
    pub violations: Vec<StyleViolation>,
}

pub fn validate(text: &str, contract: &StyleContract) -> Vec<StyleViolation> {
    let mut violations = Vec::new();

    let words = count_words(text);
    if words > contract.max_words {
        violations.push(StyleViolation::TooManyWords {
            count: words,
            max: contract.max_words,
        });
    }

    let sentences = count_sentences(text);
    if sentences > contract.max_sentences {
        violations.push(StyleViolation::TooManySentences {
            count: sentences,
            max: contract.max_sentences,
        });
    }

    if contract.require_trailing_question && !ends_with_question(text) {
        violations.push(StyleViolation::MissingTrailingQuestion);
    }

    violations
}

/// Validate a candidate and regenerate while it violates the contract, up to
/// `max_retries` regenerations. Each retry runs at the stepped-down
/// temperature for that attempt; the schedule never rises.
pub async fn shape<F, Fut>(
    candidate: String,
    contract: &StyleContract,
    mut regenerate: F,
) -> Result<ShapedResponse, ShaperError>
where
    F: FnMut(f32, &[StyleViolation]) -> Fut,
    Fut: Future<Output = Result<String, LlmGatewayError>>,
{
    let mut text = candidate;
    let mut violations = validate(&text, contract);
    let mut retry = 0_u32;

    while !violations.is_empty() && retry < contract.max_retries {
        let temperature = contract.temperature_for_retry(retry);
        debug!(retry, temperature, violation_count = violations.len(), "regenerating off-contract response");

        text = regenerate(temperature, &violations).await?;
        violations = validate(&text, contract);
        retry += 1;
    }

    Ok(ShapedResponse {
        satisfied: violations.is_empty(),
        attempts: retry + 1,
        text,
        violations,
    })
}

/// Feedback block appended to the regeneration prompt so the model knows
/// which constraints the previous candidate missed.
pub fn regeneration_feedback(violations: &[StyleViolation], contract: &StyleContract) -> String {
    let mut feedback = String::from("Your previous reply broke these rules:\n");
    for violation in violations {
        feedback.push_str("- ");
        feedback.push_str(&violation.to_string());
        feedback.push('\n');
    }
    feedback.push_str(&format!(
        "Rewrite it completely: at most {} words, at most {} sentences{}.",
        contract.max_words,
        contract.max_sentences,
        if contract.require_trailing_question {
            ", ending with one gentle question"
        } else {
            ""
        }
    ));
    feedback
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn count_sentences(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|fragment| fragment.chars().any(|c| c.is_alphanumeric()))
        .count()
}

fn ends_with_question(text: &str) -> bool {
    text.trim_end().ends_with('?')
}
