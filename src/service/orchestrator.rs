//! Benchmark orchestrator
//!
//! Resolves the requested providers, honors checkpoints, runs transport
//! families in parallel and folds everything into the final summary.
//! Provider failures never abort the run; only an empty provider selection does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::model::{
    BenchmarkSummary, Config, Coverage, PromptCase, Proportion, ProviderDescriptor,
    ProviderRunResult, ProviderStatus, ProviderSummary, RunFingerprint, TransportFamily,
};
use crate::registry::ProviderRegistry;
use crate::service::analyzer::Analyzer;
use crate::service::checkpoint::CheckpointStore;
use crate::service::fingerprint::run_fingerprint;
use crate::service::llm::CapabilityProvider;
use crate::service::runner::{ProviderRunner, RunnerSettings};
use crate::service::stats::{Z_95, chi_squared_independence, wilson_interval};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error("No providers selected (unknown ids: {unknown:?})")]
    NoProviders { unknown: Vec<String> },
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub fingerprint: RunFingerprint,
    pub summary: BenchmarkSummary,
    /// In registry order
    pub results: Vec<ProviderRunResult>,
}

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    capabilities: Arc<dyn CapabilityProvider>,
    analyzer: Arc<dyn Analyzer>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        capabilities: Arc<dyn CapabilityProvider>,
        analyzer: Arc<dyn Analyzer>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            registry,
            capabilities,
            analyzer,
            checkpoints,
        }
    }

    pub async fn run(
        &self,
        config: &Config,
        prompts: Vec<PromptCase>,
    ) -> Result<BenchmarkOutcome, OrchestratorError> {
        let start_time = Instant::now();

        let (descriptors, unknown) = self.registry.resolve(&config.selected_providers);
        for id in &unknown {
            tracing::warn!(provider = %id, "Ignoring unknown provider");
        }
        if descriptors.is_empty() {
            return Err(OrchestratorError::NoProviders { unknown });
        }

        let fingerprint = run_fingerprint(config.iterations, config.rounds, config.condition, &prompts);
        tracing::info!(
            providers = descriptors.len(),
            prompts = prompts.len(),
            iterations = config.iterations,
            rounds = config.rounds,
            condition = %config.condition,
            resume = config.resume,
            "Starting benchmark"
        );

        let mut finished: HashMap<String, ProviderRunResult> = HashMap::new();
        if config.resume {
            for descriptor in &descriptors {
                if let Some(result) = self.checkpoints.load(&descriptor.id, &fingerprint).await {
                    finished.insert(descriptor.id.clone(), result);
                }
            }
        }

        let mut by_family: BTreeMap<TransportFamily, Vec<ProviderDescriptor>> = BTreeMap::new();
        for descriptor in descriptors.iter().filter(|d| !finished.contains_key(&d.id)) {
            by_family
                .entry(descriptor.family)
                .or_default()
                .push(descriptor.clone());
        }

        let runner = ProviderRunner::new(
            Arc::clone(&self.analyzer),
            Arc::clone(&self.checkpoints),
            RunnerSettings {
                iterations: config.iterations,
                rounds: config.rounds,
                condition: config.condition,
                call_timeout: config.call_timeout(),
            },
        );
        let prompts = Arc::new(prompts);

        let family_runs = by_family.into_iter().map(|(family, providers)| {
            self.run_family(family, providers, config, &runner, &prompts, &fingerprint)
        });
        for result in join_all(family_runs).await.into_iter().flatten() {
            finished.insert(result.provider_id.clone(), result);
        }

        let results: Vec<ProviderRunResult> = descriptors
            .iter()
            .filter_map(|d| finished.remove(&d.id))
            .collect();
        let summary = summarize(&results);

        tracing::info!(
            elapsed_ms = start_time.elapsed().as_millis(),
            completed = summary.providers.len(),
            skipped = summary.skipped_providers.len(),
            failed = summary.failed_providers.len(),
            significant = summary.comparison.significant,
            "Benchmark completed"
        );

        Ok(BenchmarkOutcome {
            fingerprint,
            summary,
            results,
        })
    }

    /// Providers of one family run one after another; units within a provider
    /// run up to the family concurrency
    async fn run_family(
        &self,
        family: TransportFamily,
        providers: Vec<ProviderDescriptor>,
        config: &Config,
        runner: &ProviderRunner,
        prompts: &Arc<Vec<PromptCase>>,
        fingerprint: &RunFingerprint,
    ) -> Vec<ProviderRunResult> {
        let limits = config.family_limits(family);
        let mut results = Vec::with_capacity(providers.len());

        for descriptor in providers {
            let capability = self.capabilities.capability_for(&descriptor);
            let runner = runner.clone();
            let prompts = Arc::clone(prompts);
            let fingerprint = fingerprint.clone();
            let provider_id = descriptor.id.clone();

            // Spawned so a panicking provider is contained to its own task
            let handle = tokio::spawn(async move {
                runner
                    .run(&descriptor, capability, limits, &prompts, &fingerprint)
                    .await
            });

            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(provider = %provider_id, family = %family, error = %e, "Provider task failed");
                    results.push(ProviderRunResult::failed(&provider_id, e.to_string()));
                }
            }
        }

        results
    }
}

/// Summary statistics over completed providers.
///
/// Skipped and failed providers are listed but never enter a denominator.
pub fn summarize(results: &[ProviderRunResult]) -> BenchmarkSummary {
    let mut providers = BTreeMap::new();
    let mut groups = BTreeMap::new();
    let mut skipped_providers = Vec::new();
    let mut failed_providers = Vec::new();

    for result in results {
        match result.status {
            ProviderStatus::Completed => {}
            ProviderStatus::Skipped { .. } => {
                skipped_providers.push(result.provider_id.clone());
                continue;
            }
            ProviderStatus::Failed { .. } => {
                failed_providers.push(result.provider_id.clone());
                continue;
            }
        }

        let remediation = &result.remediation;
        let remediation_fix_rate = (remediation.attempts > 0)
            .then(|| wilson_interval(remediation.fully_fixed, remediation.attempts, Z_95));

        providers.insert(
            result.provider_id.clone(),
            ProviderSummary {
                vulnerability_rate: wilson_interval(result.vulnerable_units, result.total_units, Z_95),
                remediation_fix_rate,
                coverage: Coverage {
                    attempted: result.total_units,
                    errored: result.errored_units,
                    analysis_errors: result.analysis_errors,
                },
            },
        );
        groups.insert(
            result.provider_id.clone(),
            Proportion {
                successes: result.vulnerable_units,
                total: result.total_units,
            },
        );
    }

    BenchmarkSummary {
        providers,
        comparison: chi_squared_independence(&groups),
        skipped_providers,
        failed_providers,
    }
}
