//! Round-to-round change classification
//!
//! Compares the findings of two consecutive rounds by rule identifier. A rule
//! that disappears is fixed, one that appears is introduced, and one present
//! on both sides persisted. A round that fixes something while introducing a
//! previously absent rule is the "hydra" case and is flagged as a regression.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ChangeReport, Finding};

/// Multiplicity of each rule identifier
fn rule_counts(findings: &[Finding]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.rule_id.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Classify the change from `previous` to `current`
pub fn classify(previous: &[Finding], current: &[Finding]) -> ChangeReport {
    let before = rule_counts(previous);
    let after = rule_counts(current);

    let mut fixed = BTreeSet::new();
    let mut persisted = BTreeSet::new();
    let mut introduced = BTreeSet::new();
    let mut fixed_count = 0;
    let mut persisted_count = 0;
    let mut introduced_count = 0;

    for (rule, &prev) in &before {
        match after.get(rule) {
            Some(&curr) => {
                persisted.insert(rule.to_string());
                persisted_count += prev.min(curr);
            }
            None => {
                fixed.insert(rule.to_string());
                fixed_count += prev;
            }
        }
    }

    for (rule, &curr) in &after {
        if !before.contains_key(rule) {
            introduced.insert(rule.to_string());
            introduced_count += curr;
        }
    }

    let is_regression = !introduced.is_empty();

    ChangeReport {
        fixed,
        persisted,
        introduced,
        fixed_count,
        persisted_count,
        introduced_count,
        is_regression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn findings(rules: &[&str]) -> Vec<Finding> {
        rules
            .iter()
            .enumerate()
            .map(|(i, r)| Finding::new(*r, Severity::Medium, "test", i + 1, 1, "test"))
            .collect()
    }

    fn rule_ids(rules: &[&str]) -> BTreeSet<String> {
        rules.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_hydra_round() {
        let report = classify(&findings(&["A", "B"]), &findings(&["B", "C"]));

        assert_eq!(report.fixed, rule_ids(&["A"]));
        assert_eq!(report.persisted, rule_ids(&["B"]));
        assert_eq!(report.introduced, rule_ids(&["C"]));
        assert!(report.is_regression);
    }

    #[test]
    fn test_everything_fixed() {
        let report = classify(&findings(&["A", "B", "C"]), &[]);

        assert_eq!(report.fixed_count, 3);
        assert_eq!(report.introduced_count, 0);
        assert!(!report.is_regression);
    }

    #[test]
    fn test_repeated_rules_use_multiset_counts() {
        let report = classify(&findings(&["A", "A", "A", "B"]), &findings(&["A", "A", "C", "C"]));

        assert_eq!(report.persisted_count, 2);
        assert_eq!(report.fixed_count, 1);
        assert_eq!(report.introduced_count, 2);
        assert!(report.introduced_count + report.persisted_count <= 4);
    }

    #[test]
    fn test_identical_rounds_are_no_op() {
        let x = findings(&["A", "B", "B"]);
        let report = classify(&x, &x);

        assert!(report.fixed.is_empty());
        assert!(report.introduced.is_empty());
        assert_eq!(report.persisted, rule_ids(&["A", "B"]));
        assert_eq!(report.persisted_count, 3);
    }

    #[test]
    fn test_set_laws_hold_for_sample_pairs() {
        let samples: Vec<Vec<Finding>> = vec![
            findings(&[]),
            findings(&["A"]),
            findings(&["A", "B"]),
            findings(&["B", "C", "C"]),
            findings(&["D", "A", "D", "E"]),
        ];

        for p in &samples {
            for c in &samples {
                let forward = classify(p, c);
                let backward = classify(c, p);

                assert!(forward.fixed.is_disjoint(&forward.persisted));
                assert!(forward.fixed.is_disjoint(&forward.introduced));
                assert!(forward.persisted.is_disjoint(&forward.introduced));

                let prev_ids: BTreeSet<String> = p.iter().map(|f| f.rule_id.clone()).collect();
                let curr_ids: BTreeSet<String> = c.iter().map(|f| f.rule_id.clone()).collect();
                let fixed_or_kept: BTreeSet<String> =
                    forward.fixed.union(&forward.persisted).cloned().collect();
                let new_or_kept: BTreeSet<String> =
                    forward.introduced.union(&forward.persisted).cloned().collect();
                assert_eq!(fixed_or_kept, prev_ids);
                assert_eq!(new_or_kept, curr_ids);

                assert_eq!(forward.introduced, backward.fixed);
                assert_eq!(forward.fixed, backward.introduced);
                assert!(forward.introduced_count + forward.persisted_count <= c.len());
            }
        }
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = classify(&findings(&["A", "B", "C"]), &findings(&["C", "D"]));
        let b = classify(&findings(&["C", "A", "B"]), &findings(&["D", "C"]));
        assert_eq!(a, b);
    }
}
