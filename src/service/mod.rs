pub mod analyzer;
pub mod checkpoint;
pub mod classifier;
pub mod fingerprint;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod runner;
pub mod stats;

#[cfg(test)]
pub mod testing;

pub use analyzer::RuleAnalyzer;
pub use checkpoint::FileCheckpointStore;
pub use llm::LiveCapabilities;
pub use orchestrator::{Orchestrator, OrchestratorError};
