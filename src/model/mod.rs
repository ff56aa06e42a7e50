pub mod attempt;
pub mod config;
pub mod finding;
pub mod prompt;
pub mod provider;
pub mod results;
pub mod run;
pub mod summary;

pub use attempt::{AttemptStatus, ChangeReport, GenerationAttempt, PromptRun, StopReason, UnitOutcome};
pub use config::{Config, FamilyLimits};
pub use finding::{Finding, Severity};
pub use prompt::PromptCase;
pub use provider::{PromptDelivery, ProviderDescriptor, TransportFamily};
pub use results::{ProviderRunResult, ProviderStatus};
pub use run::{RunCondition, RunFingerprint};
pub use summary::{
    BenchmarkReport, BenchmarkSummary, ChiSquaredResult, Coverage, Proportion, ProviderSummary,
    WilsonInterval,
};
