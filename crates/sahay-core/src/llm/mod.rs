pub mod contracts;
pub mod gateway;
pub mod moderation;
pub mod openrouter;
pub mod prompts;
pub mod validation;

pub use contracts::{
    ContractError, DailySummaryContract, JudgmentCategory, SafetyJudgmentContract,
    StructuredCapability, StructuredOutputContract, output_schema,
};
pub use gateway::{
    ChatMessage, ChatRole, GenerationRequest, GenerationResponse, LlmGateway, LlmGatewayError,
    LlmGatewayFuture,
};
pub use moderation::{
    ModerationError, ModerationGateway, ModerationOutcome, OpenAiModerationConfig,
    OpenAiModerationGateway,
};
pub use openrouter::{OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig};
pub use prompts::{PromptTemplate, companion_system_prompt, template_for_capability};
pub use validation::{OutputValidationError, validate_output_json, validate_output_value};
