use std::env;

use thiserror::Error;

use crate::timezone;

const DEFAULT_MAX_WORDS: usize = 50;
const DEFAULT_MAX_SENTENCES: usize = 3;
const DEFAULT_REQUIRE_TRAILING_QUESTION: bool = true;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_TEMPERATURE: f32 = 0.5;
const DEFAULT_TEMPERATURE_DECREMENT: f32 = 0.2;

const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
const DEFAULT_GENERATION_MAX_TOKENS: u32 = 120;
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 500;
const DEFAULT_MIN_TURNS_FOR_SUMMARY: usize = 10;

const DEFAULT_MODERATION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_JUDGMENT_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_MODERATION_BLOCK_THRESHOLD: f64 = 0.5;
const DEFAULT_MODERATION_FLAG_THRESHOLD: f64 = 0.7;
const DEFAULT_JUDGMENT_CONFIDENCE_THRESHOLD: f64 = 0.7;
const DEFAULT_JUDGMENT_ABUSE_CONFIDENCE_THRESHOLD: f64 = 0.6;

const DEFAULT_MODERATION_BLOCK_CATEGORIES: &str =
    "self-harm,self-harm/intent,self-harm/instructions";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid float in env var {0}")]
    ParseFloat(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid IANA timezone in env var {key}: {value}")]
    InvalidTimeZone { key: String, value: String },
}

/// Constraints a generated response must satisfy before it is shown, plus
/// the regeneration budget used to enforce them. Read-only during a turn.
#[derive(Debug, Clone)]
pub struct StyleContract {
    pub max_words: usize,
    pub max_sentences: usize,
    pub require_trailing_question: bool,
    /// Regenerations allowed after the first candidate; at most
    /// `max_retries + 1` generations total per turn.
    pub max_retries: u32,
    pub retry_temperature: f32,
    pub temperature_decrement: f32,
}

impl StyleContract {
    /// Temperature for the given retry (0-based). Steps down by the
    /// configured decrement and never rises or goes below zero.
    pub fn temperature_for_retry(&self, retry: u32) -> f32 {
        (self.retry_temperature - self.temperature_decrement * retry as f32).max(0.0)
    }
}

impl Default for StyleContract {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            max_sentences: DEFAULT_MAX_SENTENCES,
            require_trailing_question: DEFAULT_REQUIRE_TRAILING_QUESTION,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_temperature: DEFAULT_RETRY_TEMPERATURE,
            temperature_decrement: DEFAULT_TEMPERATURE_DECREMENT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub style: StyleContract,
    pub generation_temperature: f32,
    pub generation_max_tokens: u32,
    pub summary_max_tokens: u32,
    pub min_turns_for_summary: usize,
    /// IANA name of the reference civil timezone used for day boundaries.
    pub reference_time_zone: String,
    pub moderation_timeout_ms: u64,
    pub judgment_timeout_ms: u64,
    /// Moderation categories that block when scored at or above the block
    /// threshold; every other category can only flag.
    pub moderation_block_categories: Vec<String>,
    pub moderation_block_threshold: f64,
    pub moderation_flag_threshold: f64,
    pub judgment_confidence_threshold: f64,
    pub judgment_abuse_confidence_threshold: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            style: StyleContract::default(),
            generation_temperature: DEFAULT_GENERATION_TEMPERATURE,
            generation_max_tokens: DEFAULT_GENERATION_MAX_TOKENS,
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            min_turns_for_summary: DEFAULT_MIN_TURNS_FOR_SUMMARY,
            reference_time_zone: timezone::DEFAULT_REFERENCE_TIME_ZONE.to_string(),
            moderation_timeout_ms: DEFAULT_MODERATION_TIMEOUT_MS,
            judgment_timeout_ms: DEFAULT_JUDGMENT_TIMEOUT_MS,
            moderation_block_categories: split_list(DEFAULT_MODERATION_BLOCK_CATEGORIES),
            moderation_block_threshold: DEFAULT_MODERATION_BLOCK_THRESHOLD,
            moderation_flag_threshold: DEFAULT_MODERATION_FLAG_THRESHOLD,
            judgment_confidence_threshold: DEFAULT_JUDGMENT_CONFIDENCE_THRESHOLD,
            judgment_abuse_confidence_threshold: DEFAULT_JUDGMENT_ABUSE_CONFIDENCE_THRESHOLD,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reference_time_zone = match env::var("REFERENCE_TIMEZONE") {
            Ok(raw) => timezone::normalize_time_zone(&raw).ok_or(ConfigError::InvalidTimeZone {
                key: "REFERENCE_TIMEZONE".to_string(),
                value: raw,
            })?,
            Err(_) => defaults.reference_time_zone,
        };

        Ok(Self {
            style: StyleContract {
                max_words: parse_usize_env("GUARDRAILS_MAX_WORDS", defaults.style.max_words)?,
                max_sentences: parse_usize_env(
                    "GUARDRAILS_MAX_SENTENCES",
                    defaults.style.max_sentences,
                )?,
                require_trailing_question: parse_bool_env(
                    "GUARDRAILS_REQUIRE_QUESTION",
                    defaults.style.require_trailing_question,
                )?,
                max_retries: parse_u32_env("GUARDRAILS_MAX_RETRIES", defaults.style.max_retries)?,
                retry_temperature: parse_f32_env(
                    "GUARDRAILS_RETRY_TEMPERATURE",
                    defaults.style.retry_temperature,
                )?,
                temperature_decrement: parse_f32_env(
                    "GUARDRAILS_TEMPERATURE_DECREMENT",
                    defaults.style.temperature_decrement,
                )?,
            },
            generation_temperature: parse_f32_env(
                "MODEL_TEMPERATURE",
                defaults.generation_temperature,
            )?,
            generation_max_tokens: parse_u32_env("MODEL_MAX_TOKENS", defaults.generation_max_tokens)?,
            summary_max_tokens: parse_u32_env("SUMMARY_MAX_TOKENS", defaults.summary_max_tokens)?,
            min_turns_for_summary: parse_usize_env(
                "SUMMARY_MIN_TURNS",
                defaults.min_turns_for_summary,
            )?,
            reference_time_zone,
            moderation_timeout_ms: parse_u64_env(
                "MODERATION_TIMEOUT_MS",
                defaults.moderation_timeout_ms,
            )?,
            judgment_timeout_ms: parse_u64_env("JUDGMENT_TIMEOUT_MS", defaults.judgment_timeout_ms)?,
            moderation_block_categories: match env::var("MODERATION_HIGH_RISK_CATEGORIES") {
                Ok(raw) => split_list(&raw),
                Err(_) => defaults.moderation_block_categories,
            },
            moderation_block_threshold: parse_f64_env(
                "MODERATION_BLOCK_THRESHOLD",
                defaults.moderation_block_threshold,
            )?,
            moderation_flag_threshold: parse_f64_env(
                "MODERATION_FLAG_THRESHOLD",
                defaults.moderation_flag_threshold,
            )?,
            judgment_confidence_threshold: parse_f64_env(
                "JUDGMENT_CONFIDENCE_THRESHOLD",
                defaults.judgment_confidence_threshold,
            )?,
            judgment_abuse_confidence_threshold: parse_f64_env(
                "JUDGMENT_ABUSE_CONFIDENCE_THRESHOLD",
                defaults.judgment_abuse_confidence_threshold,
            )?,
        })
    }

    /// Confidence a model-based judgment must cross before it flags.
    /// Abuse disclosures use a lower bar than the other categories.
    pub fn judgment_threshold_for(&self, is_abuse: bool) -> f64 {
        if is_abuse {
            self.judgment_abuse_confidence_threshold
        } else {
            self.judgment_confidence_threshold
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_f32_env(key: &str, default: f32) -> Result<f32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f32>()
            .map_err(|_| ConfigError::ParseFloat(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_f64_env(key: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| ConfigError::ParseFloat(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::ParseBool(key.to_string())),
        },
        Err(_) => Ok(default),
    }
}
