use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{PromptCase, ProviderDescriptor, RunCondition, TransportFamily};

const ENV_CONFIG_PATH: &str = "BENCH_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "bench.yaml";

const ENV_ITERATIONS: &str = "BENCH_ITERATIONS";
const ENV_ROUNDS: &str = "BENCH_ROUNDS";
const ENV_CONDITION: &str = "BENCH_CONDITION";
const ENV_RESUME: &str = "BENCH_RESUME";
const ENV_PROVIDERS: &str = "BENCH_PROVIDERS";
const ENV_TIMEOUT_SECS: &str = "BENCH_TIMEOUT_SECS";
const ENV_OUTPUT_DIR: &str = "BENCH_OUTPUT_DIR";
const ENV_CHECKPOINT_DIR: &str = "BENCH_CHECKPOINT_DIR";
const ENV_HTTP_CONCURRENCY: &str = "BENCH_HTTP_CONCURRENCY";
const ENV_HTTP_RATE_LIMIT_MS: &str = "BENCH_HTTP_RATE_LIMIT_MS";
const ENV_CLI_CONCURRENCY: &str = "BENCH_CLI_CONCURRENCY";
const ENV_CLI_RATE_LIMIT_MS: &str = "BENCH_CLI_RATE_LIMIT_MS";

const DEFAULT_ITERATIONS: u32 = 1;
const DEFAULT_ROUNDS: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_OUTPUT_DIR: &str = "results";
const DEFAULT_CHECKPOINT_DIR: &str = "results/checkpoints";

/// Concurrency and pacing applied to every provider of one transport family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyLimits {
    /// Units of work in flight per provider; 1 means strictly sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Minimum spacing between the starts of consecutive provider calls
    #[serde(default)]
    pub rate_limit_ms: u64,
}

fn default_concurrency() -> usize {
    1
}

impl FamilyLimits {
    pub fn default_for(family: TransportFamily) -> Self {
        match family {
            TransportFamily::HttpApi => Self {
                concurrency: 4,
                rate_limit_ms: 250,
            },
            // CLI tools tend to share a local session, keep them serial
            TransportFamily::CliSubprocess => Self {
                concurrency: 1,
                rate_limit_ms: 1000,
            },
        }
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub iterations: Option<u32>,
    #[serde(default)]
    pub rounds: Option<u32>,
    #[serde(default)]
    pub condition: Option<RunCondition>,
    #[serde(default)]
    pub resume: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub families: BTreeMap<TransportFamily, FamilyLimits>,
    /// Additional providers, or overrides of built-in ones with the same id
    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,
    /// Replaces the built-in prompt corpus when non-empty
    #[serde(default)]
    pub prompts: Vec<PromptCase>,
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub iterations: u32,
    /// Maximum remediation rounds after the initial generation (0 disables remediation)
    pub rounds: u32,
    pub condition: RunCondition,
    pub resume: bool,
    /// Provider ids to run; empty selects the whole registry
    pub selected_providers: Vec<String>,
    pub families: BTreeMap<TransportFamily, FamilyLimits>,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub extra_providers: Vec<ProviderDescriptor>,
    #[serde(skip)]
    pub prompts: Vec<PromptCase>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            rounds: DEFAULT_ROUNDS,
            condition: RunCondition::Baseline,
            resume: false,
            selected_providers: Vec::new(),
            families: TransportFamily::ALL
                .iter()
                .map(|f| (*f, FamilyLimits::default_for(*f)))
                .collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            extra_providers: Vec::new(),
            prompts: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, then apply environment overrides
    pub fn from_env() -> Self {
        let config_path = std::env::var(ENV_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(&config_path).unwrap_or_default();
        let mut config = Self::from_file(file);

        if let Some(iterations) = env_parse(ENV_ITERATIONS) {
            config.iterations = iterations;
        }
        if let Some(rounds) = env_parse(ENV_ROUNDS) {
            config.rounds = rounds;
        }
        if let Some(condition) = env_parse(ENV_CONDITION) {
            config.condition = condition;
        }
        if let Some(resume) = env_parse::<String>(ENV_RESUME) {
            config.resume = matches!(resume.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(timeout) = env_parse(ENV_TIMEOUT_SECS) {
            config.timeout_secs = timeout;
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(ENV_CHECKPOINT_DIR) {
            config.checkpoint_dir = PathBuf::from(dir);
        }
        if let Ok(ids) = std::env::var(ENV_PROVIDERS) {
            config.selected_providers = parse_provider_list(&ids);
        }

        config.apply_family_env(TransportFamily::HttpApi, ENV_HTTP_CONCURRENCY, ENV_HTTP_RATE_LIMIT_MS);
        config.apply_family_env(TransportFamily::CliSubprocess, ENV_CLI_CONCURRENCY, ENV_CLI_RATE_LIMIT_MS);

        config
    }

    /// Build configuration from a parsed file, filling defaults
    pub fn from_file(file: ConfigFile) -> Self {
        let mut config = Self::default();
        config.iterations = file.iterations.unwrap_or(config.iterations);
        config.rounds = file.rounds.unwrap_or(config.rounds);
        config.condition = file.condition.unwrap_or(config.condition);
        config.resume = file.resume.unwrap_or(config.resume);
        config.timeout_secs = file.timeout_secs.unwrap_or(config.timeout_secs);
        config.families.extend(file.families);
        config.extra_providers = file.providers;
        config.prompts = file.prompts;
        config
    }

    pub fn family_limits(&self, family: TransportFamily) -> FamilyLimits {
        self.families
            .get(&family)
            .copied()
            .unwrap_or_else(|| FamilyLimits::default_for(family))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn apply_family_env(&mut self, family: TransportFamily, concurrency_env: &str, rate_env: &str) {
        let mut limits = self.family_limits(family);
        if let Some(concurrency) = env_parse::<usize>(concurrency_env) {
            limits.concurrency = concurrency.max(1);
        }
        if let Some(rate) = env_parse(rate_env) {
            limits.rate_limit_ms = rate;
        }
        self.families.insert(family, limits);
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring invalid environment value");
            None
        }
    }
}

fn parse_provider_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_values_override_defaults() {
        let yaml = r#"
iterations: 5
rounds: 2
condition: security_prompted
families:
  cli_subprocess:
    concurrency: 2
    rate_limit_ms: 500
providers:
  - id: local-llama
    family: cli_subprocess
    model: llama3
    label: Llama 3 (ollama)
    command: ollama
    args: ["run", "llama3"]
"#;
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let config = Config::from_file(file);

        assert_eq!(config.iterations, 5);
        assert_eq!(config.rounds, 2);
        assert_eq!(config.condition, RunCondition::SecurityPrompted);
        assert_eq!(
            config.family_limits(TransportFamily::CliSubprocess),
            FamilyLimits {
                concurrency: 2,
                rate_limit_ms: 500
            }
        );
        // Untouched family keeps its default
        assert_eq!(
            config.family_limits(TransportFamily::HttpApi),
            FamilyLimits::default_for(TransportFamily::HttpApi)
        );
        assert_eq!(config.extra_providers.len(), 1);
        assert_eq!(config.extra_providers[0].args, vec!["run", "llama3"]);
    }

    #[test]
    fn test_parse_provider_list() {
        assert_eq!(
            parse_provider_list(" openai-gpt-4o, ,gemini-cli "),
            vec!["openai-gpt-4o", "gemini-cli"]
        );
    }
}
