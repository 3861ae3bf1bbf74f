use std::collections::BTreeMap;
use std::env;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_MODERATION_URL: &str = "https://api.openai.com/v1/moderations";
const DEFAULT_MODERATION_MODEL: &str = "omni-moderation-latest";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

pub type ModerationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModerationOutcome, ModerationError>> + Send + 'a>>;

/// Raw provider moderation result for one piece of text. Thresholding into a
/// verdict happens in the classifier, not here.
#[derive(Debug, Clone, Default)]
pub struct ModerationOutcome {
    pub flagged: bool,
    pub category_scores: BTreeMap<String, f64>,
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation request timed out")]
    Timeout,
    #[error("moderation provider request failed: {0}")]
    ProviderFailure(String),
    #[error("moderation provider returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

/// Content-moderation capability. Applied to both inbound and outbound text.
pub trait ModerationGateway: Send + Sync {
    fn moderate<'a>(&'a self, text: &'a str) -> ModerationFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct OpenAiModerationConfig {
    pub moderation_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl OpenAiModerationConfig {
    pub fn from_env() -> Result<Self, ModerationConfigError> {
        let api_key = env::var("MODERATION_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ModerationConfigError::MissingVar("MODERATION_API_KEY".to_string()))?;

        let moderation_url = optional_trimmed_env("MODERATION_URL")
            .unwrap_or_else(|| DEFAULT_MODERATION_URL.to_string());

        let timeout_ms = match optional_trimmed_env("MODERATION_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ModerationConfigError::ParseInt {
                    key: "MODERATION_TIMEOUT_MS".to_string(),
                    value: raw,
                })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            moderation_url,
            api_key,
            model: optional_trimmed_env("MODERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_MODERATION_MODEL.to_string()),
            timeout_ms,
        })
    }
}

#[derive(Debug, Error)]
pub enum ModerationConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {key}: {value}")]
    ParseInt { key: String, value: String },
    #[error("failed to build moderation http client: {0}")]
    HttpClient(String),
}

#[derive(Clone)]
pub struct OpenAiModerationGateway {
    client: reqwest::Client,
    config: OpenAiModerationConfig,
}

impl OpenAiModerationGateway {
    pub fn new(config: OpenAiModerationConfig) -> Result<Self, ModerationConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ModerationConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn moderate_once(&self, text: &str) -> Result<ModerationOutcome, ModerationError> {
        let response = self
            .client
            .post(&self.config.moderation_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "input": text,
                "model": self.config.model,
            }))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModerationError::Timeout
                } else {
                    ModerationError::ProviderFailure("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModerationError::ProviderFailure(format!(
                "status={}",
                status.as_u16()
            )));
        }

        let parsed: ModerationSuccessResponse = response.json().await.map_err(|_| {
            ModerationError::InvalidProviderPayload("response_json_parse_failed".to_string())
        })?;

        let result = parsed.results.into_iter().next().ok_or_else(|| {
            ModerationError::InvalidProviderPayload("missing_moderation_result".to_string())
        })?;

        Ok(ModerationOutcome {
            flagged: result.flagged,
            category_scores: result.category_scores,
        })
    }
}

impl ModerationGateway for OpenAiModerationGateway {
    fn moderate<'a>(&'a self, text: &'a str) -> ModerationFuture<'a> {
        Box::pin(self.moderate_once(text))
    }
}

#[derive(Debug, Deserialize)]
struct ModerationSuccessResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    category_scores: BTreeMap<String, f64>,
}

fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
