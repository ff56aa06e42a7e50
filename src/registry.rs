//! Catalog of benchmarkable providers

use crate::model::{ProviderDescriptor, TransportFamily};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown provider: {0}")]
    NotFound(String),
}

/// Ordered set of provider descriptors, unique by id.
///
/// Registry order is the order results are reported in.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        let mut registry = Self {
            providers: Vec::with_capacity(providers.len()),
        };
        registry.extend(providers);
        registry
    }

    /// Built-in catalog
    pub fn builtin() -> Self {
        Self::new(vec![
            ProviderDescriptor::http("openai-gpt-4o", "gpt-4o", "OpenAI GPT-4o", "OPENAI_API_KEY"),
            ProviderDescriptor::http(
                "openai-gpt-4o-mini",
                "gpt-4o-mini",
                "OpenAI GPT-4o mini",
                "OPENAI_API_KEY",
            ),
            ProviderDescriptor::http("openai-gpt-4.1", "gpt-4.1", "OpenAI GPT-4.1", "OPENAI_API_KEY"),
            ProviderDescriptor::cli("claude-cli", "default", "Anthropic Claude CLI", "claude", &["-p"])
                .with_stdin_prompt(),
            ProviderDescriptor::cli("gemini-cli", "default", "Google Gemini CLI", "gemini", &["-p"]),
            ProviderDescriptor::cli("codex-cli", "default", "OpenAI Codex CLI", "codex", &["exec"]),
        ])
    }

    /// Add providers; a descriptor with a known id replaces the existing entry in place
    pub fn extend(&mut self, providers: impl IntoIterator<Item = ProviderDescriptor>) {
        for descriptor in providers {
            match self.providers.iter_mut().find(|p| p.id == descriptor.id) {
                Some(existing) => {
                    tracing::debug!(provider = %descriptor.id, "Overriding provider descriptor");
                    *existing = descriptor;
                }
                None => self.providers.push(descriptor),
            }
        }
    }

    pub fn describe(&self, id: &str) -> Result<&ProviderDescriptor, RegistryError> {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn list_by_family(&self, family: TransportFamily) -> Vec<&ProviderDescriptor> {
        self.providers.iter().filter(|p| p.family == family).collect()
    }

    #[cfg(test)]
    pub fn all(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Resolve requested ids into descriptors in registry order.
    ///
    /// An empty request selects every provider. Unknown ids are returned separately.
    pub fn resolve(&self, ids: &[String]) -> (Vec<ProviderDescriptor>, Vec<String>) {
        if ids.is_empty() {
            return (self.providers.clone(), Vec::new());
        }

        let unknown = ids
            .iter()
            .filter(|id| self.describe(id).is_err())
            .cloned()
            .collect();
        let selected = self
            .providers
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect();

        (selected, unknown)
    }
}
