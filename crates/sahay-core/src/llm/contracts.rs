use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::RiskSeverity;

pub const SAFETY_JUDGMENT_VERSION_V1: &str = "2026-03-01";
pub const DAILY_SUMMARY_VERSION_V1: &str = "2026-03-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StructuredCapability {
    SafetyJudgment,
    DailySummary,
}

impl StructuredCapability {
    pub const fn contract_version(self) -> &'static str {
        match self {
            Self::SafetyJudgment => SAFETY_JUDGMENT_VERSION_V1,
            Self::DailySummary => DAILY_SUMMARY_VERSION_V1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SafetyJudgmentContract {
    pub version: String,
    pub output: SafetyJudgmentOutput,
}

/// Model-based read of one user message. Advisory only: a judgment can flag
/// for review but can never block on its own.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SafetyJudgmentOutput {
    pub risk_present: bool,
    pub category: JudgmentCategory,
    pub confidence: f64,
    pub rationale: String,
    pub severity: RiskSeverity,
    pub response_needed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentCategory {
    Suicide,
    Abuse,
    Crisis,
    Distress,
    None,
}

impl JudgmentCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suicide => "suicide",
            Self::Abuse => "abuse",
            Self::Crisis => "crisis",
            Self::Distress => "distress",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DailySummaryContract {
    pub version: String,
    pub output: DailySummaryOutput,
}

/// Distillation of one civil day of conversation. Every field is optional;
/// a day with nothing notable in a dimension leaves it null.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DailySummaryOutput {
    pub main_concerns: Option<String>,
    pub emotional_patterns: Option<String>,
    pub coping_strategies: Option<String>,
    pub progress_notes: Option<String>,
    pub important_context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StructuredOutputContract {
    SafetyJudgment(SafetyJudgmentContract),
    DailySummary(DailySummaryContract),
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("structured output payload is invalid: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error(
        "structured output version mismatch for {capability:?}: expected={expected}, actual={actual}"
    )]
    VersionMismatch {
        capability: StructuredCapability,
        expected: String,
        actual: String,
    },
}

pub fn output_schema(capability: StructuredCapability) -> Value {
    match capability {
        StructuredCapability::SafetyJudgment => {
            serde_json::to_value(schema_for!(SafetyJudgmentContract))
                .expect("safety judgment schema should be serializable")
        }
        StructuredCapability::DailySummary => {
            serde_json::to_value(schema_for!(DailySummaryContract))
                .expect("daily summary schema should be serializable")
        }
    }
}

pub fn parse_contract(
    capability: StructuredCapability,
    payload: Value,
) -> Result<StructuredOutputContract, ContractError> {
    match capability {
        StructuredCapability::SafetyJudgment => {
            let contract: SafetyJudgmentContract = serde_json::from_value(payload)?;
            ensure_contract_version(capability, &contract.version)?;
            Ok(StructuredOutputContract::SafetyJudgment(contract))
        }
        StructuredCapability::DailySummary => {
            let contract: DailySummaryContract = serde_json::from_value(payload)?;
            ensure_contract_version(capability, &contract.version)?;
            Ok(StructuredOutputContract::DailySummary(contract))
        }
    }
}

fn ensure_contract_version(
    capability: StructuredCapability,
    actual_version: &str,
) -> Result<(), ContractError> {
    let expected_version = capability.contract_version();
    if actual_version == expected_version {
        return Ok(());
    }

    Err(ContractError::VersionMismatch {
        capability,
        expected: expected_version.to_string(),
        actual: actual_version.to_string(),
    })
}
