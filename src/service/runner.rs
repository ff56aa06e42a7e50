//! Provider pipeline runner
//!
//! Runs every (prompt, iteration) unit of one provider with bounded
//! concurrency, folds the unit histories into a single result and writes the
//! provider checkpoint once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::model::{
    FamilyLimits, PromptCase, PromptRun, ProviderDescriptor, ProviderRunResult, RunCondition,
    RunFingerprint,
};
use crate::service::analyzer::Analyzer;
use crate::service::checkpoint::CheckpointStore;
use crate::service::llm::{GenerationCapability, MissingPrerequisite};
use crate::service::pipeline::{ProgressLog, UnitPipeline};
use crate::service::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub iterations: u32,
    pub rounds: u32,
    pub condition: RunCondition,
    pub call_timeout: Duration,
}

#[derive(Clone)]
pub struct ProviderRunner {
    analyzer: Arc<dyn Analyzer>,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: RunnerSettings,
}

impl ProviderRunner {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            analyzer,
            checkpoints,
            settings,
        }
    }

    /// Run one provider end to end.
    ///
    /// A provider whose prerequisites are missing is reported as skipped and
    /// never checkpointed.
    pub async fn run(
        &self,
        descriptor: &ProviderDescriptor,
        capability: Result<Arc<dyn GenerationCapability>, MissingPrerequisite>,
        limits: FamilyLimits,
        prompts: &[PromptCase],
        fingerprint: &RunFingerprint,
    ) -> ProviderRunResult {
        let capability = match capability {
            Ok(capability) => capability,
            Err(missing) => {
                tracing::warn!(
                    provider = %descriptor.id,
                    reason = %missing.detail,
                    "Skipping provider, prerequisites not met"
                );
                return ProviderRunResult::skipped(&descriptor.id, missing.detail);
            }
        };

        let start_time = Instant::now();
        let concurrency = limits.concurrency.max(1);
        let live_progress = concurrency == 1;

        let pipeline = Arc::new(UnitPipeline::new(
            &descriptor.id,
            capability,
            Arc::clone(&self.analyzer),
            Arc::new(RateLimiter::new(limits.rate_limit())),
            self.settings.rounds,
            self.settings.call_timeout,
            self.settings.condition,
        ));

        // Prompt-major order: every iteration of a prompt before the next prompt
        let units: Vec<(usize, PromptCase, u32)> = prompts
            .iter()
            .flat_map(|case| (1..=self.settings.iterations).map(move |iteration| (case.clone(), iteration)))
            .enumerate()
            .map(|(index, (case, iteration))| (index, case, iteration))
            .collect();

        tracing::info!(
            provider = %descriptor.id,
            family = %descriptor.family,
            units = units.len(),
            concurrency,
            rate_limit_ms = limits.rate_limit_ms,
            "Starting provider run"
        );

        let mut runs: Vec<(usize, PromptRun)> = stream::iter(units)
            .map(|(index, case, iteration)| {
                let pipeline = Arc::clone(&pipeline);
                let provider_id = descriptor.id.clone();
                async move {
                    let mut progress = ProgressLog::new(&provider_id, live_progress);
                    let run = pipeline.run(&case, iteration, &mut progress).await;
                    progress.flush();
                    (index, run)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        runs.sort_by_key(|(index, _)| *index);
        let result = runs
            .into_iter()
            .map(|(_, run)| run)
            .fold(ProviderRunResult::new(&descriptor.id), ProviderRunResult::fold);

        tracing::info!(
            provider = %descriptor.id,
            elapsed_ms = start_time.elapsed().as_millis(),
            total_units = result.total_units,
            vulnerable_units = result.vulnerable_units,
            errored_units = result.errored_units,
            fully_fixed = result.remediation.fully_fixed,
            "Provider run completed"
        );

        if let Err(e) = self.checkpoints.save(&descriptor.id, fingerprint, &result).await {
            tracing::warn!(provider = %descriptor.id, error = %e, "Failed to save checkpoint");
        }

        result
    }
}
