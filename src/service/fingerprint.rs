//! Utilities for building run fingerprints and checkpoint keys

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::{PromptCase, RunCondition, RunFingerprint};
use crate::service::prompts::{GENERATION_SYSTEM_PROMPT, REMEDIATION_SYSTEM_PROMPT};

/// Build the fingerprint for a run
///
/// The prompt digest covers:
/// - every prompt case, in order
/// - the generation and remediation system prompts (prompt versioning)
pub fn run_fingerprint(
    iterations: u32,
    rounds: u32,
    condition: RunCondition,
    prompts: &[PromptCase],
) -> RunFingerprint {
    let corpus_hash = hash_serializable(&prompts);
    let prompt_version = hash_string(&format!(
        "{}\n{}",
        GENERATION_SYSTEM_PROMPT, REMEDIATION_SYSTEM_PROMPT
    ));

    RunFingerprint {
        iterations,
        rounds,
        condition,
        prompt_digest: hash_string(&format!("{}|{}", corpus_hash, prompt_version)),
    }
}

/// File-system safe key for one checkpoint record
///
/// One record exists per (provider, condition, iteration count).
pub fn checkpoint_key(provider_id: &str, fingerprint: &RunFingerprint) -> String {
    let provider: String = provider_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{}__{}__{}it",
        provider, fingerprint.condition, fingerprint.iterations
    )
}

/// Hash a serializable value to a hex string
fn hash_serializable<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    hash_string(&json)
}

/// Hash a string to a hex string using SHA256
fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::prompt::default_corpus;

    #[test]
    fn test_corpus_change_changes_digest() {
        let corpus = default_corpus();
        let a = run_fingerprint(1, 3, RunCondition::Baseline, &corpus);
        let b = run_fingerprint(1, 3, RunCondition::Baseline, &corpus[1..]);

        assert_eq!(a, run_fingerprint(1, 3, RunCondition::Baseline, &corpus));
        assert_ne!(a.prompt_digest, b.prompt_digest);
    }

    #[test]
    fn test_checkpoint_key_is_path_safe() {
        let fingerprint = run_fingerprint(2, 3, RunCondition::SecurityPrompted, &[]);
        assert_eq!(
            checkpoint_key("vendor/model:latest", &fingerprint),
            "vendor_model_latest__security_prompted__2it"
        );
    }
}
