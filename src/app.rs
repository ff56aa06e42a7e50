//! Application state and service initialization
//!
//! Builds the registry, capabilities, analyzer and checkpoint store from
//! configuration, runs the benchmark and writes the report artifact.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::model::prompt::default_corpus;
use crate::model::{BenchmarkReport, Config, PromptCase, TransportFamily};
use crate::registry::ProviderRegistry;
use crate::service::{
    FileCheckpointStore, LiveCapabilities, Orchestrator, OrchestratorError, RuleAnalyzer,
};

/// Application state containing all services and shared resources
pub struct AppState {
    config: Config,
    prompts: Vec<PromptCase>,
    orchestrator: Orchestrator,
}

impl AppState {
    /// Validate configuration and build the service graph
    pub fn new(config: Config) -> Result<Self, AppError> {
        if config.iterations == 0 {
            return Err(AppError::InvalidConfig("iterations must be at least 1"));
        }
        if config.timeout_secs == 0 {
            return Err(AppError::InvalidConfig("timeout_secs must be at least 1"));
        }

        let prompts = if config.prompts.is_empty() {
            default_corpus()
        } else {
            tracing::info!(prompts = config.prompts.len(), "Using configured prompt corpus");
            config.prompts.clone()
        };
        let mut seen = HashSet::new();
        if !prompts.iter().all(|p| seen.insert(p.id.as_str())) {
            return Err(AppError::InvalidConfig("prompt ids must be unique"));
        }

        let mut registry = ProviderRegistry::builtin();
        registry.extend(config.extra_providers.iter().cloned());
        for family in TransportFamily::ALL {
            tracing::debug!(
                family = %family,
                providers = registry.list_by_family(family).len(),
                limits = ?config.family_limits(family),
                "Registered providers"
            );
        }

        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            Arc::new(LiveCapabilities),
            Arc::new(RuleAnalyzer::new()),
            Arc::new(FileCheckpointStore::new(&config.checkpoint_dir)),
        );

        Ok(Self {
            config,
            prompts,
            orchestrator,
        })
    }

    /// Run the benchmark and write the report; returns the report path
    pub async fn run(&self) -> Result<PathBuf, AppError> {
        let outcome = self
            .orchestrator
            .run(&self.config, self.prompts.clone())
            .await?;

        let generated_at = Utc::now();
        let report = BenchmarkReport {
            generated_at,
            config: self.config.clone(),
            fingerprint: outcome.fingerprint,
            summary: outcome.summary,
            results: outcome.results,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| AppError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let path = self.config.output_dir.join(format!(
            "benchmark-{}.json",
            generated_at.format("%Y%m%dT%H%M%SZ")
        ));
        tokio::fs::write(&path, json).await?;

        Ok(path)
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// Report could not be written
    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(String),
}
