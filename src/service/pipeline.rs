//! Unit-of-work pipeline
//!
//! Drives one (provider, prompt, iteration) unit through
//! generate -> analyze -> [remediate -> analyze]* as a bounded round loop.
//! The loop stops when the latest round is clean, the round limit is reached,
//! a remediation call fails, the response is not code, or analysis fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::{
    Finding, GenerationAttempt, PromptCase, PromptRun, RunCondition, StopReason, UnitOutcome,
};
use crate::service::analyzer::{Analysis, Analyzer};
use crate::service::classifier::classify;
use crate::service::llm::{CapabilityError, GenerationCapability};
use crate::service::prompts::{build_generation_prompt, extract_code, looks_like_code};
use crate::service::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Generated,
    Analyzed,
    Remediating,
    Remediated,
    Reanalyzed,
    Done,
    Errored,
}

/// Progress lines for one unit, emitted live or held until the unit completes
pub struct ProgressLog {
    provider: String,
    live: bool,
    buffered: Vec<String>,
}

impl ProgressLog {
    pub fn new(provider: &str, live: bool) -> Self {
        Self {
            provider: provider.to_string(),
            live,
            buffered: Vec::new(),
        }
    }

    pub fn note(&mut self, message: String) {
        if self.live {
            tracing::info!(provider = %self.provider, "{}", message);
        } else {
            self.buffered.push(message);
        }
    }

    /// Emit buffered lines in order
    pub fn flush(self) {
        for message in self.buffered {
            tracing::info!(provider = %self.provider, "{}", message);
        }
    }
}

pub struct UnitPipeline {
    provider_id: String,
    capability: Arc<dyn GenerationCapability>,
    analyzer: Arc<dyn Analyzer>,
    limiter: Arc<RateLimiter>,
    rounds: u32,
    call_timeout: Duration,
    condition: RunCondition,
}

impl UnitPipeline {
    pub fn new(
        provider_id: &str,
        capability: Arc<dyn GenerationCapability>,
        analyzer: Arc<dyn Analyzer>,
        limiter: Arc<RateLimiter>,
        rounds: u32,
        call_timeout: Duration,
        condition: RunCondition,
    ) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            capability,
            analyzer,
            limiter,
            rounds,
            call_timeout,
            condition,
        }
    }

    /// Run one unit to completion. Never fails: errors are recorded on the attempts.
    pub async fn run(&self, case: &PromptCase, iteration: u32, progress: &mut ProgressLog) -> PromptRun {
        let mut state = UnitState::Pending;
        let mut attempts: Vec<GenerationAttempt> = Vec::new();

        let prompt = build_generation_prompt(case, self.condition);
        let started = Instant::now();
        let response = self.call(self.capability.generate(&prompt)).await;

        let mut code = match response {
            Ok(text) => {
                self.transition(&mut state, UnitState::Generated, case);
                extract_code(&text)
            }
            Err(e) => {
                self.transition(&mut state, UnitState::Errored, case);
                progress.note(format!("{} #{}: generation failed: {}", case.id, iteration, e));
                attempts.push(GenerationAttempt::generation_error(0, e.to_string(), started.elapsed()));
                return self.finish(case, iteration, UnitOutcome::Errored, StopReason::GenerationFailed, attempts);
            }
        };

        let analysis = self.analyze(&code).await;
        self.transition(&mut state, UnitState::Analyzed, case);
        progress.note(format!(
            "{} #{}: round 0 -> {} finding(s)",
            case.id,
            iteration,
            analysis.findings.len()
        ));
        let mut findings: Vec<Finding> = analysis.findings.clone();
        let mut analysis_failed = analysis.parse_error.is_some();
        attempts.push(GenerationAttempt::analyzed(
            0,
            code.clone(),
            analysis.findings,
            analysis.parse_error,
            started.elapsed(),
            None,
        ));

        let mut round = 0;
        let stop_reason = loop {
            if analysis_failed {
                break StopReason::AnalysisFailed;
            }
            if findings.is_empty() {
                break StopReason::Clean;
            }
            if round >= self.rounds {
                break StopReason::RoundLimit;
            }
            round += 1;

            self.transition(&mut state, UnitState::Remediating, case);
            let started = Instant::now();
            let response = self.call(self.capability.remediate(&code, &findings)).await;

            let text = match response {
                Ok(text) => text,
                Err(e) => {
                    progress.note(format!("{} #{}: round {} remediation failed: {}", case.id, iteration, round, e));
                    attempts.push(GenerationAttempt::generation_error(round, e.to_string(), started.elapsed()));
                    break StopReason::RemediationFailed;
                }
            };

            if !looks_like_code(&text) {
                progress.note(format!("{} #{}: round {} returned a non-code response", case.id, iteration, round));
                attempts.push(GenerationAttempt::non_code(round, text, started.elapsed()));
                break StopReason::NonCodeResponse;
            }

            self.transition(&mut state, UnitState::Remediated, case);
            code = extract_code(&text);
            let analysis = self.analyze(&code).await;
            self.transition(&mut state, UnitState::Reanalyzed, case);

            // A parse failure yields no findings; comparing it would read as "all fixed"
            let change = match analysis.parse_error {
                Some(_) => None,
                None => Some(classify(&findings, &analysis.findings)),
            };
            if let Some(ref change) = change {
                progress.note(format!(
                    "{} #{}: round {} -> {} finding(s), fixed {}, introduced {}{}",
                    case.id,
                    iteration,
                    round,
                    analysis.findings.len(),
                    change.fixed_count,
                    change.introduced_count,
                    if change.is_regression { " (regression)" } else { "" }
                ));
            }

            analysis_failed = analysis.parse_error.is_some();
            if !analysis_failed {
                findings = analysis.findings.clone();
            }
            attempts.push(GenerationAttempt::analyzed(
                round,
                code.clone(),
                analysis.findings,
                analysis.parse_error,
                started.elapsed(),
                change,
            ));
        };

        self.transition(&mut state, UnitState::Done, case);
        self.finish(case, iteration, UnitOutcome::Completed, stop_reason, attempts)
    }

    /// Run an external capability call under the rate limiter and deadline
    async fn call<F>(&self, call: F) -> Result<String, CapabilityError>
    where
        F: Future<Output = Result<String, CapabilityError>>,
    {
        self.limiter.acquire().await;
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(self.call_timeout)),
        }
    }

    async fn analyze(&self, code: &str) -> Analysis {
        match tokio::time::timeout(self.call_timeout, self.analyzer.analyze(code)).await {
            Ok(analysis) => analysis,
            Err(_) => Analysis::parse_error(format!(
                "analysis exceeded {:?} deadline",
                self.call_timeout
            )),
        }
    }

    fn transition(&self, state: &mut UnitState, next: UnitState, case: &PromptCase) {
        tracing::trace!(
            provider = %self.provider_id,
            prompt = %case.id,
            from = ?*state,
            to = ?next,
            "Unit state transition"
        );
        *state = next;
    }

    fn finish(
        &self,
        case: &PromptCase,
        iteration: u32,
        outcome: UnitOutcome,
        stop_reason: StopReason,
        attempts: Vec<GenerationAttempt>,
    ) -> PromptRun {
        PromptRun {
            prompt_id: case.id.clone(),
            category: case.category.clone(),
            iteration,
            outcome,
            stop_reason,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptStatus;
    use crate::service::testing::{MarkerAnalyzer, ScriptedCapability, code_with};

    fn pipeline(capability: ScriptedCapability, rounds: u32) -> UnitPipeline {
        UnitPipeline::new(
            "test",
            Arc::new(capability),
            Arc::new(MarkerAnalyzer),
            Arc::new(RateLimiter::new(Duration::ZERO)),
            rounds,
            Duration::from_secs(5),
            RunCondition::Baseline,
        )
    }

    fn case() -> PromptCase {
        PromptCase::new("case-1", "database", "Write a query helper.", &[])
    }

    async fn run(capability: ScriptedCapability, rounds: u32) -> PromptRun {
        let mut progress = ProgressLog::new("test", true);
        pipeline(capability, rounds).run(&case(), 1, &mut progress).await
    }

    #[tokio::test]
    async fn test_remediation_fixes_everything() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A", "B", "C"])))
            .then_remediate(Ok(code_with(&[])));

        let unit = run(capability, 3).await;

        assert_eq!(unit.outcome, UnitOutcome::Completed);
        assert_eq!(unit.stop_reason, StopReason::Clean);
        assert_eq!(unit.attempts.len(), 2);
        let change = unit.attempts[1].change.as_ref().unwrap();
        assert_eq!(change.fixed_count, 3);
        assert_eq!(change.introduced_count, 0);
    }

    #[tokio::test]
    async fn test_hydra_round_is_recorded() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A", "B"])))
            .then_remediate(Ok(code_with(&["B", "C"])));

        let unit = run(capability, 1).await;

        assert_eq!(unit.stop_reason, StopReason::RoundLimit);
        let change = unit.attempts[1].change.as_ref().unwrap();
        assert!(change.fixed.contains("A"));
        assert!(change.persisted.contains("B"));
        assert!(change.introduced.contains("C"));
        assert!(change.is_regression);
    }

    #[tokio::test]
    async fn test_generation_failure_is_terminal() {
        let capability =
            ScriptedCapability::new(Err(CapabilityError::Transport("connection refused".into())));

        let unit = run(capability, 3).await;

        assert_eq!(unit.outcome, UnitOutcome::Errored);
        assert_eq!(unit.stop_reason, StopReason::GenerationFailed);
        assert_eq!(unit.attempts.len(), 1);
        assert_eq!(unit.attempts[0].status, AttemptStatus::GenerationError);
        assert!(unit.attempts[0].findings.is_empty());
    }

    #[tokio::test]
    async fn test_non_code_remediation_stops_the_loop() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A"])))
            .then_remediate(Ok("I am unable to help with that request.".to_string()))
            .then_remediate(Ok(code_with(&[])));

        let unit = run(capability, 3).await;

        assert_eq!(unit.stop_reason, StopReason::NonCodeResponse);
        assert_eq!(unit.attempts.len(), 2);
        assert_eq!(unit.attempts[1].status, AttemptStatus::NonCodeResponse);
        assert!(unit.attempts[1].change.is_none());
    }

    #[tokio::test]
    async fn test_remediation_failure_keeps_history() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A"])))
            .then_remediate(Err(CapabilityError::Transport("HTTP 500".into())));

        let unit = run(capability, 3).await;

        assert_eq!(unit.outcome, UnitOutcome::Completed);
        assert_eq!(unit.stop_reason, StopReason::RemediationFailed);
        assert_eq!(unit.attempts[1].status, AttemptStatus::GenerationError);
    }

    #[tokio::test]
    async fn test_round_limit_zero_skips_remediation() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A"])));

        let unit = run(capability, 0).await;

        assert_eq!(unit.stop_reason, StopReason::RoundLimit);
        assert_eq!(unit.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_stops_without_classification() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A"])))
            .then_remediate(Ok("function broken() {".to_string()));

        let unit = run(capability, 3).await;

        assert_eq!(unit.stop_reason, StopReason::AnalysisFailed);
        assert!(unit.attempts[1].parse_error);
        assert!(unit.attempts[1].change.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_as_failure() {
        let capability = ScriptedCapability::new(Ok(code_with(&["A"])))
            .with_delay(Duration::from_secs(60));

        let unit = run(capability, 3).await;

        assert_eq!(unit.outcome, UnitOutcome::Errored);
        assert!(unit.attempts[0].error.as_ref().unwrap().contains("deadline"));
    }

    /// Shared buffer that collects formatted log output
    #[derive(Clone, Default)]
    struct CapturedLines(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLines {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLines {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn capture<F: FnOnce(&CapturedLines)>(f: F) -> CapturedLines {
        let captured = CapturedLines::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || f(&captured));
        captured
    }

    #[test]
    fn test_buffered_progress_waits_for_flush() {
        let captured = capture(|captured| {
            let mut progress = ProgressLog::new("gemini-cli", false);
            progress.note("case-1 #0: round 1".to_string());
            progress.note("case-1 #0: round 2".to_string());
            assert!(captured.lines().is_empty());

            progress.flush();
        });

        let lines = captured.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("case-1 #0: round 1"));
        assert!(lines[1].contains("case-1 #0: round 2"));
        assert!(lines.iter().all(|l| l.contains("provider=gemini-cli")));
    }

    #[test]
    fn test_live_progress_logs_immediately() {
        capture(|captured| {
            let mut progress = ProgressLog::new("claude-cli", true);
            progress.note("case-2 #1: generation failed".to_string());
            let lines = captured.lines();
            assert_eq!(lines.len(), 1);
            assert!(lines[0].contains("case-2 #1: generation failed"));

            progress.flush();
            assert_eq!(captured.lines().len(), 1);
        });
    }
}
