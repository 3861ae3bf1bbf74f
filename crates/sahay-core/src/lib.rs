pub mod config;
pub mod escalation;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod safety;
pub mod shaper;
pub mod store;
pub mod timezone;
