use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use super::contracts::{
    ContractError, StructuredCapability, StructuredOutputContract, output_schema, parse_contract,
};

#[derive(Debug, Error)]
pub enum OutputValidationError {
    #[error("structured output is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("schema for {capability:?} failed to compile: {message}")]
    SchemaCompile {
        capability: StructuredCapability,
        message: String,
    },
    #[error("structured output failed schema validation for {capability:?}: {errors:?}")]
    SchemaViolation {
        capability: StructuredCapability,
        errors: Vec<String>,
    },
    #[error(transparent)]
    Contract(#[from] ContractError),
}

pub fn validate_output_json(
    capability: StructuredCapability,
    raw_json: &str,
) -> Result<StructuredOutputContract, OutputValidationError> {
    let payload: Value = serde_json::from_str(raw_json)?;
    validate_output_value(capability, &payload)
}

pub fn validate_output_value(
    capability: StructuredCapability,
    payload: &Value,
) -> Result<StructuredOutputContract, OutputValidationError> {
    let validator = validator_for_capability(capability)?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OutputValidationError::SchemaViolation { capability, errors });
    }

    parse_contract(capability, payload.clone()).map_err(OutputValidationError::from)
}

static SAFETY_JUDGMENT_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(StructuredCapability::SafetyJudgment))
        .map_err(|err| err.to_string())
});

static DAILY_SUMMARY_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(StructuredCapability::DailySummary))
        .map_err(|err| err.to_string())
});

fn validator_for_capability(
    capability: StructuredCapability,
) -> Result<&'static JSONSchema, OutputValidationError> {
    let validator_result = match capability {
        StructuredCapability::SafetyJudgment => &*SAFETY_JUDGMENT_VALIDATOR,
        StructuredCapability::DailySummary => &*DAILY_SUMMARY_VALIDATOR,
    };

    validator_result
        .as_ref()
        .map_err(|message| OutputValidationError::SchemaCompile {
            capability,
            message: message.clone(),
        })
}
