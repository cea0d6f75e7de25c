//! Checkpoint stores for Copydesk run state.
//!
//! Two implementations of [`pipeline::CheckpointStore`]:
//!
//! - [`InMemoryCheckpointStore`]: process-local, for tests and one-shot runs.
//! - [`FileCheckpointStore`]: one JSON document per job under a directory.
//!   Each save writes a temporary file in the same directory, syncs it, and
//!   renames it over the previous checkpoint, so a reader never observes a
//!   partially written state.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Implements a port defined in [`pipeline`]. Every
//! failure surfaces to callers as [`PipelineError::CheckpointUnavailable`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{CheckpointStore, JobId, PipelineError, RunState};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures inside a checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode run state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("checkpoint {} is corrupt: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint writer task failed: {0}")]
    Writer(String),
}

impl From<CheckpointError> for PipelineError {
    fn from(e: CheckpointError) -> Self {
        PipelineError::CheckpointUnavailable {
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A [`CheckpointStore`] backed by a map. Saves replace the whole entry.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<JobId, RunState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, job_id: JobId, state: &RunState) -> Result<(), PipelineError> {
        self.states.write().await.insert(job_id, state.clone());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<RunState>, PipelineError> {
        Ok(self.states.read().await.get(&job_id).cloned())
    }

    async fn purge(&self, job_id: JobId) -> Result<bool, PipelineError> {
        Ok(self.states.write().await.remove(&job_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// A [`CheckpointStore`] keeping `<dir>/<job_id>.json` per job.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// A store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for `job_id`.
    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let io = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(|source| CheckpointError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut temp = NamedTempFile::new_in(dir).map_err(io)?;
    temp.write_all(bytes).map_err(io)?;
    temp.as_file().sync_all().map_err(io)?;
    temp.persist(path).map_err(|e| io(e.error))?;
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, job_id: JobId, state: &RunState) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec_pretty(state).map_err(CheckpointError::Encode)?;
        let dir = self.dir.clone();
        let path = self.path_for(job_id);
        let written = bytes.len();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes))
            .await
            .map_err(|e| CheckpointError::Writer(e.to_string()))??;
        debug!(%job_id, bytes = written, phase = %state.phase(), "checkpoint saved");
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<RunState>, PipelineError> {
        let path = self.path_for(job_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: path.clone(),
                    source,
                }
                .into())
            }
        };
        let state = serde_json::from_str(&text)
            .map_err(|source| CheckpointError::Decode { path, source })?;
        Ok(Some(state))
    }

    async fn purge(&self, job_id: JobId) -> Result<bool, PipelineError> {
        let path = self.path_for(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CheckpointError::Io {
                path: path.clone(),
                source,
            }
            .into()),
        }
    }
}
