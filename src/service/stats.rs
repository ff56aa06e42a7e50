//! Proportion statistics
//!
//! Wilson score intervals for per-provider rates and a chi-squared test of
//! independence comparing those rates across providers.

use std::collections::BTreeMap;

use crate::model::{ChiSquaredResult, Proportion, WilsonInterval};

/// z-score for a 95% confidence level
pub const Z_95: f64 = 1.96;

/// Chi-squared critical values at p = 0.05, indexed by degrees of freedom - 1
const CHI_SQUARED_CRITICAL_05: [f64; 5] = [3.841, 5.991, 7.815, 9.488, 11.070];

/// Wilson score interval for `successes` out of `n`, as percentages.
///
/// Returns all zeros when `n == 0`.
pub fn wilson_interval(successes: usize, n: usize, z: f64) -> WilsonInterval {
    if n == 0 {
        return WilsonInterval::default();
    }

    let successes = successes.min(n);
    let n_f = n as f64;
    let p = successes as f64 / n_f;
    let z2 = z * z;

    let denominator = 1.0 + z2 / n_f;
    let center = (p + z2 / (2.0 * n_f)) / denominator;
    let margin = z * (p * (1.0 - p) / n_f + z2 / (4.0 * n_f * n_f)).sqrt() / denominator;

    let point = p * 100.0;
    // Clamp float noise at the p = 0 and p = 1 boundaries
    let lower = ((center - margin).max(0.0) * 100.0).min(point);
    let upper = ((center + margin).min(1.0) * 100.0).max(point);

    WilsonInterval {
        lower,
        point,
        upper,
    }
}

/// Critical value at p = 0.05 for `df` degrees of freedom.
///
/// Only df 1 through 5 are tabulated; larger df reuse the df = 5 value. That
/// bound is lower than the true critical value, so large comparisons are
/// flagged significant more readily than an exact table would.
pub fn critical_value_05(df: usize) -> f64 {
    let index = df.clamp(1, CHI_SQUARED_CRITICAL_05.len()) - 1;
    CHI_SQUARED_CRITICAL_05[index]
}

/// Chi-squared test of independence over a groups x {success, failure} table
pub fn chi_squared_independence(groups: &BTreeMap<String, Proportion>) -> ChiSquaredResult {
    if groups.len() < 2 {
        return ChiSquaredResult::default();
    }

    let total: usize = groups.values().map(|g| g.total).sum();
    let successes: usize = groups.values().map(|g| g.successes.min(g.total)).sum();
    let degrees_of_freedom = groups.len() - 1;
    let critical_value = critical_value_05(degrees_of_freedom);

    if total == 0 {
        return ChiSquaredResult {
            statistic: 0.0,
            degrees_of_freedom,
            critical_value,
            significant: false,
        };
    }

    let total_f = total as f64;
    let success_share = successes as f64 / total_f;
    let failure_share = (total - successes) as f64 / total_f;

    let mut statistic = 0.0;
    for group in groups.values() {
        let n = group.total as f64;
        let observed_success = group.successes.min(group.total) as f64;
        let observed_failure = n - observed_success;

        for (observed, expected) in [
            (observed_success, n * success_share),
            (observed_failure, n * failure_share),
        ] {
            if expected > 0.0 {
                statistic += (observed - expected).powi(2) / expected;
            }
        }
    }

    ChiSquaredResult {
        statistic,
        degrees_of_freedom,
        critical_value,
        significant: statistic > critical_value,
    }
}
