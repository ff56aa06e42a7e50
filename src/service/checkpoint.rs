//! Checkpoint persistence for resumable runs
//!
//! A checkpoint is written once per provider, after its pipeline has fully
//! completed. On load the stored fingerprint is compared field by field with the
//! active run; any mismatch or unreadable record is treated exactly like a
//! missing one and the file is left in place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ProviderRunResult, RunFingerprint};
use crate::service::fingerprint::checkpoint_key;

/// Bumped whenever the checkpoint or result shape changes
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persisted snapshot of one provider's completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub provider_id: String,
    pub saved_at: DateTime<Utc>,
    pub fingerprint: RunFingerprint,
    pub result: ProviderRunResult,
}

/// Trait for checkpoint stores
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored result for the provider, only if it was produced under `fingerprint`
    async fn load(&self, provider_id: &str, fingerprint: &RunFingerprint)
    -> Option<ProviderRunResult>;

    async fn save(
        &self,
        provider_id: &str,
        fingerprint: &RunFingerprint,
        result: &ProviderRunResult,
    ) -> Result<(), CheckpointError>;
}

/// Validate a decoded checkpoint against the requested provider and fingerprint
pub fn accept_checkpoint(
    checkpoint: Checkpoint,
    provider_id: &str,
    fingerprint: &RunFingerprint,
) -> Option<ProviderRunResult> {
    if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
        tracing::info!(
            provider = %provider_id,
            stored = checkpoint.schema_version,
            expected = CHECKPOINT_SCHEMA_VERSION,
            "Ignoring checkpoint with different schema version"
        );
        return None;
    }

    if checkpoint.provider_id != provider_id || checkpoint.result.provider_id != provider_id {
        tracing::warn!(
            provider = %provider_id,
            stored = %checkpoint.provider_id,
            "Ignoring checkpoint recorded for another provider"
        );
        return None;
    }

    let mismatches = checkpoint.fingerprint.mismatches(fingerprint);
    if !mismatches.is_empty() {
        tracing::info!(
            provider = %provider_id,
            fields = ?mismatches,
            "Ignoring checkpoint produced under a different configuration"
        );
        return None;
    }

    if !checkpoint.result.is_completed() {
        return None;
    }

    Some(checkpoint.result)
}

/// JSON-file checkpoint store, one file per (provider, condition, iteration count)
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, provider_id: &str, fingerprint: &RunFingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.json", checkpoint_key(provider_id, fingerprint)))
    }

    async fn read(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(
        &self,
        provider_id: &str,
        fingerprint: &RunFingerprint,
    ) -> Option<ProviderRunResult> {
        let path = self.path_for(provider_id, fingerprint);

        match Self::read(&path).await {
            Ok(Some(checkpoint)) => {
                let result = accept_checkpoint(checkpoint, provider_id, fingerprint);
                if result.is_some() {
                    tracing::info!(provider = %provider_id, path = %path.display(), "Resuming from checkpoint");
                }
                result
            }
            Ok(None) => {
                tracing::debug!(provider = %provider_id, path = %path.display(), "No checkpoint found");
                None
            }
            Err(e) => {
                tracing::warn!(provider = %provider_id, path = %path.display(), error = %e, "Unreadable checkpoint, ignoring");
                None
            }
        }
    }

    async fn save(
        &self,
        provider_id: &str,
        fingerprint: &RunFingerprint,
        result: &ProviderRunResult,
    ) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            provider_id: provider_id.to_string(),
            saved_at: Utc::now(),
            fingerprint: fingerprint.clone(),
            result: result.clone(),
        };
        let json = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a half-written record
        let path = self.path_for(provider_id, fingerprint);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::debug!(provider = %provider_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }
}
