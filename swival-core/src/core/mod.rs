//! Core runtime: token estimation, context management, the guardrail, and
//! the agent loop itself.

pub mod agent;
pub mod context_manager;
pub mod guardrail;
pub mod token_estimator;

pub use agent::{AgentRunner, RunSummary, RunnerConfig};
pub use context_manager::{
    CompactionOutcome, CompactionStrategy, ContextConfig, ContextManager, level1_summary,
};
pub use guardrail::{Guardrail, GuardrailIntervention, GuardrailLevel};
pub use token_estimator::TokenEstimator;
