use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Config, ProviderRunResult, RunFingerprint};

/// Wilson score interval, all values as percentages in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WilsonInterval {
    pub lower: f64,
    pub point: f64,
    pub upper: f64,
}

/// Successes out of a total, one row of a contingency table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proportion {
    pub successes: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChiSquaredResult {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    /// Critical value at p = 0.05 used for the decision (0 when not applicable)
    pub critical_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coverage {
    pub attempted: usize,
    pub errored: usize,
    pub analysis_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub vulnerability_rate: WilsonInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_fix_rate: Option<WilsonInterval>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    /// Keyed by provider id; only providers that completed
    pub providers: BTreeMap<String, ProviderSummary>,
    /// Vulnerability rates compared across completed providers
    pub comparison: ChiSquaredResult,
    pub skipped_providers: Vec<String>,
    pub failed_providers: Vec<String>,
}

/// Final artifact of a run, consumed by downstream reporting
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub generated_at: DateTime<Utc>,
    pub config: Config,
    pub fingerprint: RunFingerprint,
    pub summary: BenchmarkSummary,
    pub results: Vec<ProviderRunResult>,
}
