//! Deterministic fakes shared by the service tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::model::{Finding, ProviderDescriptor, ProviderRunResult, RunFingerprint, Severity};
use crate::service::analyzer::{Analysis, Analyzer};
use crate::service::checkpoint::{
    CHECKPOINT_SCHEMA_VERSION, Checkpoint, CheckpointError, CheckpointStore, accept_checkpoint,
};
use crate::service::llm::{
    CapabilityError, CapabilityProvider, GenerationCapability, MissingPrerequisite,
};

const MARKER: &str = "// finding:";

/// JavaScript source carrying one marker comment per rule id
pub fn code_with(rules: &[&str]) -> String {
    let mut code = String::from("function handler(input) {\n");
    for rule in rules {
        code.push_str(&format!("  {}{}\n", MARKER, rule));
    }
    code.push_str("  return input;\n}\n");
    code
}

/// Reports one finding per marker comment; unbalanced braces are a parse error
pub struct MarkerAnalyzer;

#[async_trait]
impl Analyzer for MarkerAnalyzer {
    async fn analyze(&self, source: &str) -> Analysis {
        let open = source.matches('{').count();
        let close = source.matches('}').count();
        if open != close {
            return Analysis::parse_error(format!("{} '{{' vs {} '}}'", open, close));
        }

        let findings = source
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let rule = line.trim().strip_prefix(MARKER)?;
                Some(
                    Finding::new(rule, Severity::High, "injection", i + 1, 3, "marker")
                        .with_classification(Some("CWE-20"), Some(7.5), Some("A03:2021")),
                )
            })
            .collect();
        Analysis::findings(findings)
    }
}

/// Fixed generation response followed by a queue of remediation responses
pub struct ScriptedCapability {
    generation: Result<String, CapabilityError>,
    remediations: Mutex<VecDeque<Result<String, CapabilityError>>>,
    delay: Duration,
}

impl ScriptedCapability {
    pub fn new(generation: Result<String, CapabilityError>) -> Self {
        Self {
            generation,
            remediations: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn then_remediate(self, response: Result<String, CapabilityError>) -> Self {
        self.remediations.lock().unwrap().push_back(response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl GenerationCapability for ScriptedCapability {
    async fn generate(&self, _prompt: &str) -> Result<String, CapabilityError> {
        tokio::time::sleep(self.delay).await;
        self.generation.clone()
    }

    async fn remediate(&self, _code: &str, _findings: &[Finding]) -> Result<String, CapabilityError> {
        tokio::time::sleep(self.delay).await;
        self.remediations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Transport("script exhausted".into())))
    }
}

/// Derives its responses from the prompt text, so any number of units can share it.
///
/// A prompt containing `rules: A,B` produces code with findings A and B. Each
/// remediation drops the first reported finding. Response latency varies per
/// prompt so that concurrent units complete out of order.
pub struct PromptDrivenCapability;

impl PromptDrivenCapability {
    fn rules_in(prompt: &str) -> Vec<&str> {
        prompt
            .split_once("rules:")
            .map(|(_, rest)| {
                rest.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn latency(text: &str) -> Duration {
        let spread = text.bytes().map(u64::from).sum::<u64>() % 7;
        Duration::from_millis(1 + spread * 3)
    }
}

#[async_trait]
impl GenerationCapability for PromptDrivenCapability {
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        tokio::time::sleep(Self::latency(prompt)).await;
        Ok(format!("```javascript\n{}```", code_with(&Self::rules_in(prompt))))
    }

    async fn remediate(&self, code: &str, findings: &[Finding]) -> Result<String, CapabilityError> {
        tokio::time::sleep(Self::latency(code)).await;
        let remaining: Vec<&str> = findings.iter().skip(1).map(|f| f.rule_id.as_str()).collect();
        Ok(code_with(&remaining))
    }
}

pub struct PanickingCapability;

#[async_trait]
impl GenerationCapability for PanickingCapability {
    async fn generate(&self, _prompt: &str) -> Result<String, CapabilityError> {
        panic!("provider task crashed")
    }

    async fn remediate(&self, _code: &str, _findings: &[Finding]) -> Result<String, CapabilityError> {
        panic!("provider task crashed")
    }
}

/// Capability lookup with per-provider overrides and a shared fallback
pub struct FakeCapabilities {
    fallback: Arc<dyn GenerationCapability>,
    overrides: HashMap<String, Arc<dyn GenerationCapability>>,
    missing: HashSet<String>,
}

impl FakeCapabilities {
    pub fn new(fallback: Arc<dyn GenerationCapability>) -> Self {
        Self {
            fallback,
            overrides: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    pub fn with_missing(mut self, provider_id: &str) -> Self {
        self.missing.insert(provider_id.to_string());
        self
    }

    pub fn with_override(mut self, provider_id: &str, capability: Arc<dyn GenerationCapability>) -> Self {
        self.overrides.insert(provider_id.to_string(), capability);
        self
    }
}

impl CapabilityProvider for FakeCapabilities {
    fn capability_for(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Arc<dyn GenerationCapability>, MissingPrerequisite> {
        if self.missing.contains(&descriptor.id) {
            return Err(MissingPrerequisite::new(&descriptor.id, "FAKE_API_KEY is not set"));
        }
        Ok(self
            .overrides
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback)))
    }
}

/// Checkpoint store kept in memory, with a save counter
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, Checkpoint>>,
    saves: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn saved_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, provider_id: &str, fingerprint: &RunFingerprint) -> Option<ProviderRunResult> {
        let checkpoint = self.records.lock().unwrap().get(provider_id).cloned()?;
        accept_checkpoint(checkpoint, provider_id, fingerprint)
    }

    async fn save(
        &self,
        provider_id: &str,
        fingerprint: &RunFingerprint,
        result: &ProviderRunResult,
    ) -> Result<(), CheckpointError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(
            provider_id.to_string(),
            Checkpoint {
                schema_version: CHECKPOINT_SCHEMA_VERSION,
                provider_id: provider_id.to_string(),
                saved_at: Utc::now(),
                fingerprint: fingerprint.clone(),
                result: result.clone(),
            },
        );
        Ok(())
    }
}

/// Checkpoint store whose writes always fail
pub struct FailingCheckpointStore;

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn load(&self, _provider_id: &str, _fingerprint: &RunFingerprint) -> Option<ProviderRunResult> {
        None
    }

    async fn save(
        &self,
        _provider_id: &str,
        _fingerprint: &RunFingerprint,
        _result: &ProviderRunResult,
    ) -> Result<(), CheckpointError> {
        Err(CheckpointError::Io(std::io::Error::other("disk full")))
    }
}
