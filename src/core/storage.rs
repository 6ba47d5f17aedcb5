//! Output storage collaborators

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::errors::{PipelineError, PipelineResult};

/// Where assembled documents are persisted
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Persist `text` under a new `identifier`
    ///
    /// Existing outputs are never replaced; a taken identifier yields
    /// [`PipelineError::OutputExists`].
    async fn save(&self, identifier: &str, text: &str) -> PipelineResult<()>;
}

/// Writes each output to `<dir>/<identifier>`
#[derive(Debug, Clone)]
pub struct FsOutputStore {
    dir: PathBuf,
}

impl FsOutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a stored output
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(identifier)
    }
}

#[async_trait]
impl OutputStore for FsOutputStore {
    async fn save(&self, identifier: &str, text: &str) -> PipelineResult<()> {
        // Ensure output directory exists
        if !self.dir.exists() {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| PipelineError::StorageError {
                    path: self.dir.display().to_string(),
                    message: e.to_string(),
                })?;
        }

        let path = self.path_for(identifier);
        let storage_error = |e: std::io::Error| PipelineError::StorageError {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::OutputExists {
                    identifier: identifier.to_string(),
                });
            }
            Err(e) => return Err(storage_error(e)),
        };

        file.write_all(text.as_bytes()).await.map_err(storage_error)?;
        file.flush().await.map_err(storage_error)?;

        debug!("Wrote {} bytes to {}", text.len(), path.display());
        Ok(())
    }
}

/// Keeps outputs in memory
#[derive(Debug, Default)]
pub struct MemoryOutputStore {
    outputs: RwLock<HashMap<String, String>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, identifier: &str) -> Option<String> {
        self.outputs.read().await.get(identifier).cloned()
    }

    pub async fn len(&self) -> usize {
        self.outputs.read().await.len()
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn save(&self, identifier: &str, text: &str) -> PipelineResult<()> {
        let mut outputs = self.outputs.write().await;
        if outputs.contains_key(identifier) {
            return Err(PipelineError::OutputExists {
                identifier: identifier.to_string(),
            });
        }
        outputs.insert(identifier.to_string(), text.to_string());
        Ok(())
    }
}
