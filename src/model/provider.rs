use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of external capability a provider is reached through.
///
/// Families are the unit at which providers run in parallel with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFamily {
    HttpApi,
    CliSubprocess,
}

impl TransportFamily {
    pub const ALL: [TransportFamily; 2] = [TransportFamily::HttpApi, TransportFamily::CliSubprocess];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportFamily::HttpApi => "http_api",
            TransportFamily::CliSubprocess => "cli_subprocess",
        }
    }
}

impl fmt::Display for TransportFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a CLI provider receives its prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDelivery {
    /// Appended as the last argument; bounded by the OS per-argument limit
    #[default]
    Argument,
    /// Written to the child's stdin
    Stdin,
}

// Describes one code-generation backend
// - id: stable key used for selection, checkpoints and report ordering
// - model: model identifier passed to the backend
// - command / args: program invoked for the CLI family
// - prompt_delivery: whether the CLI reads the prompt from its last argument or stdin
// - credential_env: env var that must be set before the provider can run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub family: TransportFamily,
    pub model: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub prompt_delivery: PromptDelivery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
}

impl ProviderDescriptor {
    pub fn http(id: &str, model: &str, label: &str, credential_env: &str) -> Self {
        Self {
            id: id.to_string(),
            family: TransportFamily::HttpApi,
            model: model.to_string(),
            label: label.to_string(),
            command: None,
            args: Vec::new(),
            prompt_delivery: PromptDelivery::default(),
            credential_env: Some(credential_env.to_string()),
        }
    }

    pub fn cli(id: &str, model: &str, label: &str, command: &str, args: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            family: TransportFamily::CliSubprocess,
            model: model.to_string(),
            label: label.to_string(),
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            prompt_delivery: PromptDelivery::default(),
            credential_env: None,
        }
    }

    pub fn with_stdin_prompt(mut self) -> Self {
        self.prompt_delivery = PromptDelivery::Stdin;
        self
    }
}

impl fmt::Display for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}
