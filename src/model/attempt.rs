use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    AnalysisError,
    GenerationError,
    NonCodeResponse,
}

/// Difference between the findings of two consecutive rounds.
///
/// The three sets are disjoint. Counts come from per-rule multiplicities, so
/// `persisted_count` may exceed `persisted.len()` when a rule fires repeatedly.
/// Only built by [`crate::service::classifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub fixed: BTreeSet<String>,
    pub persisted: BTreeSet<String>,
    pub introduced: BTreeSet<String>,
    pub fixed_count: usize,
    pub persisted_count: usize,
    pub introduced_count: usize,
    pub is_regression: bool,
}

// One generate-or-remediate + analyze cycle
// - round: 0 for the initial generation, >= 1 for remediation rounds
// - change: comparison against the previous round, present on analyzed remediation rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub round: u32,
    pub status: AttemptStatus,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub parse_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeReport>,
}

impl GenerationAttempt {
    pub fn analyzed(
        round: u32,
        code: String,
        findings: Vec<Finding>,
        parse_error: Option<String>,
        elapsed: Duration,
        change: Option<ChangeReport>,
    ) -> Self {
        let status = if parse_error.is_some() {
            AttemptStatus::AnalysisError
        } else {
            AttemptStatus::Success
        };
        Self {
            round,
            status,
            code,
            findings,
            duration_ms: elapsed.as_millis() as u64,
            parse_error: parse_error.is_some(),
            error: parse_error,
            change,
        }
    }

    pub fn generation_error(round: u32, error: String, elapsed: Duration) -> Self {
        Self {
            round,
            status: AttemptStatus::GenerationError,
            code: String::new(),
            findings: Vec::new(),
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error),
            parse_error: false,
            change: None,
        }
    }

    pub fn non_code(round: u32, response: String, elapsed: Duration) -> Self {
        Self {
            round,
            status: AttemptStatus::NonCodeResponse,
            code: response,
            findings: Vec::new(),
            duration_ms: elapsed.as_millis() as u64,
            error: Some("remediation response is not recognizable as code".to_string()),
            parse_error: false,
            change: None,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.status == AttemptStatus::Success
    }
}

/// Why a unit of work stopped iterating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Latest analyzed round has no findings
    Clean,
    RoundLimit,
    GenerationFailed,
    RemediationFailed,
    NonCodeResponse,
    AnalysisFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed,
    /// Initial generation failed; the unit contributes no findings
    Errored,
}

/// Raw history of one (prompt, iteration) unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRun {
    pub prompt_id: String,
    pub category: String,
    pub iteration: u32,
    pub outcome: UnitOutcome,
    pub stop_reason: StopReason,
    pub attempts: Vec<GenerationAttempt>,
}

impl PromptRun {
    /// Initial round, if it was produced
    pub fn initial(&self) -> Option<&GenerationAttempt> {
        self.attempts.first().filter(|a| a.round == 0)
    }

    /// Most recent round whose code was analyzed without error
    pub fn last_analyzed(&self) -> Option<&GenerationAttempt> {
        self.attempts.iter().rev().find(|a| a.is_analyzed())
    }

    pub fn remediation_rounds(&self) -> impl Iterator<Item = &GenerationAttempt> {
        self.attempts.iter().filter(|a| a.round > 0)
    }
}
