//! The agent loop.

mod runner;

pub use runner::{AgentRunner, RunSummary, RunnerConfig};
