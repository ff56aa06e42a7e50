//! Per-provider aggregate built by folding unit histories

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AttemptStatus, PromptRun, UnitOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProviderStatus {
    Completed,
    /// Prerequisites unmet; never checkpointed
    Skipped { reason: String },
    /// Provider task aborted before producing a result
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub units: usize,
    pub vulnerable: usize,
}

// Remediation effectiveness across all units that entered at least one remediation round
// - attempts: units with >= 1 remediation round (errored rounds included)
// - fully_fixed: units whose last analyzed round has zero findings
// - findings_before / findings_after: initial vs last analyzed round finding totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationEffectiveness {
    pub attempts: usize,
    pub fully_fixed: usize,
    pub units_with_regression: usize,
    pub findings_before: usize,
    pub findings_after: usize,
    pub fixed_total: usize,
    pub introduced_total: usize,
    pub failed_rounds: usize,
    pub non_code_responses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRunResult {
    pub provider_id: String,
    pub status: ProviderStatus,
    /// Every unit run, errored ones included
    pub total_units: usize,
    /// Units whose initial round produced at least one finding
    pub vulnerable_units: usize,
    pub errored_units: usize,
    pub analysis_errors: usize,
    pub total_findings: usize,
    pub by_category: BTreeMap<String, CategoryCounts>,
    pub by_rule: BTreeMap<String, usize>,
    pub by_cwe: BTreeMap<String, usize>,
    pub by_owasp: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub remediation: RemediationEffectiveness,
    pub by_prompt: Vec<PromptRun>,
}

impl ProviderRunResult {
    pub fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: ProviderStatus::Completed,
            total_units: 0,
            vulnerable_units: 0,
            errored_units: 0,
            analysis_errors: 0,
            total_findings: 0,
            by_category: BTreeMap::new(),
            by_rule: BTreeMap::new(),
            by_cwe: BTreeMap::new(),
            by_owasp: BTreeMap::new(),
            by_severity: BTreeMap::new(),
            remediation: RemediationEffectiveness::default(),
            by_prompt: Vec::new(),
        }
    }

    pub fn skipped(provider_id: &str, reason: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Skipped {
                reason: reason.into(),
            },
            ..Self::new(provider_id)
        }
    }

    pub fn failed(provider_id: &str, reason: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Failed {
                reason: reason.into(),
            },
            ..Self::new(provider_id)
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, ProviderStatus::Completed)
    }

    /// Fold one unit history into the aggregate.
    ///
    /// Errored units count toward `total_units` and never toward `vulnerable_units`.
    pub fn fold(mut self, run: PromptRun) -> Self {
        self.total_units += 1;
        let category = self.by_category.entry(run.category.clone()).or_default();
        category.units += 1;

        if run.outcome == UnitOutcome::Errored {
            self.errored_units += 1;
            self.by_prompt.push(run);
            return self;
        }

        if let Some(initial) = run.initial() {
            if initial.status == AttemptStatus::AnalysisError {
                self.analysis_errors += 1;
            }

            if !initial.findings.is_empty() {
                self.vulnerable_units += 1;
                category.vulnerable += 1;
            }

            self.total_findings += initial.findings.len();
            for finding in &initial.findings {
                *self.by_rule.entry(finding.rule_id.clone()).or_default() += 1;
                *self
                    .by_severity
                    .entry(finding.severity.as_str().to_string())
                    .or_default() += 1;
                if let Some(ref cwe) = finding.cwe {
                    *self.by_cwe.entry(cwe.clone()).or_default() += 1;
                }
                if let Some(ref owasp) = finding.owasp {
                    *self.by_owasp.entry(owasp.clone()).or_default() += 1;
                }
            }
        }

        self.fold_remediation(&run);
        self.by_prompt.push(run);
        self
    }

    fn fold_remediation(&mut self, run: &PromptRun) {
        let mut rounds = run.remediation_rounds().peekable();
        if rounds.peek().is_none() {
            return;
        }

        let before = run.initial().map(|a| a.findings.len()).unwrap_or(0);
        let after = run.last_analyzed().map(|a| a.findings.len()).unwrap_or(before);

        let stats = &mut self.remediation;
        stats.attempts += 1;
        stats.findings_before += before;
        stats.findings_after += after;
        if after == 0 {
            stats.fully_fixed += 1;
        }

        let mut regressed = false;
        for round in rounds {
            match round.status {
                AttemptStatus::GenerationError | AttemptStatus::AnalysisError => {
                    stats.failed_rounds += 1
                }
                AttemptStatus::NonCodeResponse => stats.non_code_responses += 1,
                AttemptStatus::Success => {}
            }
            if let Some(ref change) = round.change {
                stats.fixed_total += change.fixed_count;
                stats.introduced_total += change.introduced_count;
                regressed |= change.is_regression;
            }
        }
        if regressed {
            stats.units_with_regression += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{Finding, GenerationAttempt, Severity, StopReason};
    use crate::service::classifier::classify;

    fn finding(rule: &str) -> Finding {
        Finding::new(rule, Severity::High, "injection", 1, 1, "test")
            .with_classification(Some("CWE-89"), Some(8.0), Some("A03:2021"))
    }

    fn run(id: &str, outcome: UnitOutcome, attempts: Vec<GenerationAttempt>) -> PromptRun {
        PromptRun {
            prompt_id: id.to_string(),
            category: "database".to_string(),
            iteration: 1,
            outcome,
            stop_reason: StopReason::Clean,
            attempts,
        }
    }

    #[test]
    fn test_errored_unit_counts_toward_denominator_only() {
        let errored = run(
            "a",
            UnitOutcome::Errored,
            vec![GenerationAttempt::generation_error(
                0,
                "connection reset".to_string(),
                Duration::ZERO,
            )],
        );

        let result = ProviderRunResult::new("p").fold(errored);

        assert_eq!(result.total_units, 1);
        assert_eq!(result.errored_units, 1);
        assert_eq!(result.vulnerable_units, 0);
        assert_eq!(result.total_findings, 0);
        assert_eq!(result.by_prompt.len(), 1);
    }

    #[test]
    fn test_fully_fixed_remediation() {
        let initial = vec![finding("a"), finding("b"), finding("c")];
        let change = classify(&initial, &[]);
        let unit = run(
            "a",
            UnitOutcome::Completed,
            vec![
                GenerationAttempt::analyzed(0, "x".into(), initial, None, Duration::ZERO, None),
                GenerationAttempt::analyzed(1, "y".into(), vec![], None, Duration::ZERO, Some(change)),
            ],
        );

        let result = ProviderRunResult::new("p").fold(unit);

        assert_eq!(result.vulnerable_units, 1);
        assert_eq!(result.total_findings, 3);
        assert_eq!(result.by_cwe.get("CWE-89"), Some(&3));
        assert_eq!(result.remediation.attempts, 1);
        assert_eq!(result.remediation.fully_fixed, 1);
        assert_eq!(result.remediation.findings_before, 3);
        assert_eq!(result.remediation.findings_after, 0);
        assert_eq!(result.remediation.fixed_total, 3);
        assert_eq!(result.remediation.units_with_regression, 0);
    }

    #[test]
    fn test_failed_remediation_keeps_initial_findings() {
        let unit = run(
            "a",
            UnitOutcome::Completed,
            vec![
                GenerationAttempt::analyzed(0, "x".into(), vec![finding("a")], None, Duration::ZERO, None),
                GenerationAttempt::generation_error(1, "timeout".into(), Duration::ZERO),
            ],
        );

        let result = ProviderRunResult::new("p").fold(unit);

        assert_eq!(result.remediation.attempts, 1);
        assert_eq!(result.remediation.fully_fixed, 0);
        assert_eq!(result.remediation.findings_after, 1);
        assert_eq!(result.remediation.failed_rounds, 1);
    }
}
