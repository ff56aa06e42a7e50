//! Code-generation capabilities
//!
//! One implementation per transport family. The implementation for a provider is
//! chosen once, when the orchestrator resolves it, and never re-dispatched per call.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::providers::openai;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::model::{Finding, PromptDelivery, ProviderDescriptor, TransportFamily};
use crate::service::prompts::{
    GENERATION_SYSTEM_PROMPT, REMEDIATION_SYSTEM_PROMPT, build_remediation_prompt,
};

/// Default credential for the HTTP API family
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Maximum stderr length kept in transport errors
const MAX_STDERR_CHARS: usize = 500;

/// Largest single argument the kernel accepts (MAX_ARG_STRLEN, less the NUL)
const MAX_PROMPT_ARG_BYTES: usize = 128 * 1024 - 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Call exceeded {0:?} deadline")]
    Timeout(Duration),
}

/// Provider could not be started (missing credential or binary)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing prerequisite for {provider}: {detail}")]
pub struct MissingPrerequisite {
    pub provider: String,
    pub detail: String,
}

impl MissingPrerequisite {
    pub fn new(provider: &str, detail: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }
}

/// Trait for code-generation backends
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Generate code for a prompt; returns the raw response text
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError>;

    /// Ask the backend to fix `findings` in `code`; returns the raw response text
    async fn remediate(&self, code: &str, findings: &[Finding]) -> Result<String, CapabilityError>;
}

/// Selects the capability implementation for a provider
pub trait CapabilityProvider: Send + Sync {
    fn capability_for(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Arc<dyn GenerationCapability>, MissingPrerequisite>;
}

/// Shared LLM client wrapper
#[derive(Clone)]
pub struct LlmClient {
    client: openai::Client,
}

impl LlmClient {
    /// Create a new LLM client with the provided API key
    pub fn new(api_key: &str) -> Result<Self, String> {
        // rig-core 0.24: client construction is infallible
        let client = openai::Client::new(api_key);

        Ok(Self { client })
    }

    /// Get a reference to the underlying OpenAI client
    pub fn openai_client(&self) -> &openai::Client {
        &self.client
    }
}

/// LLM-extractable generation response
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedCode {
    /// Complete source code, without markdown fences
    pub code: String,
}

/// HTTP API family: OpenAI-compatible chat completion
pub struct OpenAiCapability {
    llm_client: LlmClient,
    model: String,
}

impl OpenAiCapability {
    pub fn new(llm_client: LlmClient, model: &str) -> Self {
        Self {
            llm_client,
            model: model.to_string(),
        }
    }

    async fn complete(&self, preamble: &str, prompt: String) -> Result<String, CapabilityError> {
        let start_time = std::time::Instant::now();

        let extractor = self
            .llm_client
            .openai_client()
            .extractor::<GeneratedCode>(&self.model)
            .preamble(preamble)
            .build();

        match extractor.extract(prompt).await {
            Ok(result) => {
                tracing::debug!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    "OpenAI API call completed"
                );
                Ok(result.code)
            }
            Err(e) => {
                tracing::debug!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %e,
                    "OpenAI API call failed"
                );
                Err(CapabilityError::Transport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl GenerationCapability for OpenAiCapability {
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        self.complete(GENERATION_SYSTEM_PROMPT, prompt.to_string()).await
    }

    async fn remediate(&self, code: &str, findings: &[Finding]) -> Result<String, CapabilityError> {
        self.complete(REMEDIATION_SYSTEM_PROMPT, build_remediation_prompt(code, findings))
            .await
    }
}

/// CLI subprocess family: the prompt goes in as the last argument or on stdin, stdout is the response
pub struct CliCapability {
    command: String,
    args: Vec<String>,
    delivery: PromptDelivery,
}

impl CliCapability {
    pub fn new(command: &str, args: &[String], delivery: PromptDelivery) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            delivery,
        }
    }

    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, CapabilityError> {
        let full_prompt = format!("{}\n\n{}", preamble, prompt);

        // Dropping the future on timeout must not leave the process running
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.delivery {
            PromptDelivery::Argument => {
                if full_prompt.len() > MAX_PROMPT_ARG_BYTES {
                    return Err(CapabilityError::Transport(format!(
                        "Prompt of {} bytes exceeds the {} byte argument limit for {}; use prompt_delivery: stdin",
                        full_prompt.len(),
                        MAX_PROMPT_ARG_BYTES,
                        self.command
                    )));
                }
                command.arg(&full_prompt).stdin(Stdio::null());
            }
            PromptDelivery::Stdin => {
                command.stdin(Stdio::piped());
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| CapabilityError::Transport(format!("Failed to run {}: {}", self.command, e)))?;

        let output = match child.stdin.take() {
            Some(mut stdin) => {
                // Write and drain concurrently so a chatty child cannot deadlock on a full pipe
                let write = async move {
                    let written = stdin.write_all(full_prompt.as_bytes()).await;
                    drop(stdin);
                    written
                };
                let (written, output) = tokio::join!(write, child.wait_with_output());
                if let Err(e) = written {
                    // The exit status decides; a CLI may stop reading early
                    tracing::debug!(command = %self.command, "Failed to write prompt to stdin: {}", e);
                }
                output
            }
            None => child.wait_with_output().await,
        }
        .map_err(|e| CapabilityError::Transport(format!("Failed to run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(CapabilityError::Transport(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GenerationCapability for CliCapability {
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        self.complete(GENERATION_SYSTEM_PROMPT, prompt).await
    }

    async fn remediate(&self, code: &str, findings: &[Finding]) -> Result<String, CapabilityError> {
        self.complete(REMEDIATION_SYSTEM_PROMPT, &build_remediation_prompt(code, findings))
            .await
    }
}

/// Capabilities backed by real network clients and subprocesses
pub struct LiveCapabilities;

impl CapabilityProvider for LiveCapabilities {
    fn capability_for(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Arc<dyn GenerationCapability>, MissingPrerequisite> {
        match descriptor.family {
            TransportFamily::HttpApi => {
                let env_name = descriptor
                    .credential_env
                    .as_deref()
                    .unwrap_or(ENV_OPENAI_API_KEY);
                let api_key = required_env(&descriptor.id, env_name)?;
                let client = LlmClient::new(&api_key)
                    .map_err(|e| MissingPrerequisite::new(&descriptor.id, e))?;

                Ok(Arc::new(OpenAiCapability::new(client, &descriptor.model)))
            }
            TransportFamily::CliSubprocess => {
                let command = descriptor.command.as_deref().ok_or_else(|| {
                    MissingPrerequisite::new(&descriptor.id, "no command configured")
                })?;
                if !command_available(command) {
                    return Err(MissingPrerequisite::new(
                        &descriptor.id,
                        format!("'{}' not found on PATH", command),
                    ));
                }
                if let Some(ref env_name) = descriptor.credential_env {
                    required_env(&descriptor.id, env_name)?;
                }

                Ok(Arc::new(CliCapability::new(
                    command,
                    &descriptor.args,
                    descriptor.prompt_delivery,
                )))
            }
        }
    }
}

fn required_env(provider: &str, name: &str) -> Result<String, MissingPrerequisite> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| MissingPrerequisite::new(provider, format!("{} is not set", name)))
}

/// Check whether a program can be spawned, by path or by PATH lookup
fn command_available(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }

    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_provider_without_credential_is_skipped() {
        let descriptor = ProviderDescriptor::http(
            "test-http",
            "gpt-4o-mini",
            "Test",
            "CODEGEN_SEC_BENCH_TEST_UNSET_KEY",
        );

        let err = LiveCapabilities
            .capability_for(&descriptor)
            .err()
            .expect("missing credential must be reported");

        assert_eq!(err.provider, "test-http");
        assert!(err.detail.contains("CODEGEN_SEC_BENCH_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_cli_provider_without_binary_is_skipped() {
        let descriptor = ProviderDescriptor::cli(
            "test-cli",
            "none",
            "Test",
            "codegen-sec-bench-no-such-binary",
            &[],
        );

        let err = LiveCapabilities
            .capability_for(&descriptor)
            .err()
            .expect("missing binary must be reported");

        assert!(err.detail.contains("not found on PATH"));
    }

    #[tokio::test]
    async fn test_cli_capability_returns_stdout() {
        if !command_available("echo") {
            return;
        }
        let capability = CliCapability::new("echo", &[], PromptDelivery::Argument);
        let response = capability.generate("const a = 1;").await.unwrap();
        assert!(response.contains("const a = 1;"));
    }

    #[tokio::test]
    async fn test_oversized_argument_prompt_is_rejected_before_spawn() {
        let capability =
            CliCapability::new("codegen-sec-bench-no-such-binary", &[], PromptDelivery::Argument);
        let prompt = "x".repeat(MAX_PROMPT_ARG_BYTES);

        let detail = match capability.generate(&prompt).await.unwrap_err() {
            CapabilityError::Transport(detail) => detail,
            other => panic!("expected transport error, got {:?}", other),
        };
        assert!(detail.contains("argument limit"), "{}", detail);
        assert!(detail.contains("prompt_delivery: stdin"));
    }

    #[tokio::test]
    async fn test_stdin_delivery_handles_large_prompts() {
        if !command_available("cat") {
            return;
        }
        let capability = CliCapability::new("cat", &[], PromptDelivery::Stdin);
        let mut code = String::from("const a = 1;\n");
        code.push_str(&"// padding\n".repeat(20_000));

        let response = capability.remediate(&code, &[]).await.unwrap();

        assert!(response.len() > MAX_PROMPT_ARG_BYTES);
        assert!(response.starts_with(REMEDIATION_SYSTEM_PROMPT));
        assert!(response.contains("const a = 1;"));
    }
}
