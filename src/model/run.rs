use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prompting condition a run is executed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Prompt is sent as written
    #[default]
    Baseline,
    /// Prompt is prefixed with an explicit secure-coding instruction
    SecurityPrompted,
}

impl RunCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunCondition::Baseline => "baseline",
            RunCondition::SecurityPrompted => "security_prompted",
        }
    }
}

impl fmt::Display for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "baseline" | "zero_shot" => Ok(RunCondition::Baseline),
            "security_prompted" | "secure" => Ok(RunCondition::SecurityPrompted),
            other => Err(format!("unknown run condition '{}'", other)),
        }
    }
}

/// Configuration values a checkpoint must match to be reused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub iterations: u32,
    pub rounds: u32,
    pub condition: RunCondition,
    /// SHA-256 of the serialized prompt corpus
    pub prompt_digest: String,
}

impl RunFingerprint {
    /// Names of the fields that differ from `other`
    pub fn mismatches(&self, other: &RunFingerprint) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.iterations != other.iterations {
            fields.push("iterations");
        }
        if self.rounds != other.rounds {
            fields.push("rounds");
        }
        if self.condition != other.condition {
            fields.push("condition");
        }
        if self.prompt_digest != other.prompt_digest {
            fields.push("prompt_digest");
        }
        fields
    }
}
