//! Model artifact lookup
//!
//! A model directory is searched for a fixed list of file names; the first
//! one that exists is the artifact.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::model::{checkpoint, PlantClassifierConfig};
use crate::utils::error::{CropDocError, Result};

/// Artifact file names, in priority order
pub const CANDIDATES: [&str; 2] = ["best_model.mpk", "trained_model.mpk"];

/// A resolved, existing model record and the architecture it was saved with
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub config: PlantClassifierConfig,
}

impl ModelArtifact {
    /// Use an explicit record file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(CropDocError::ModelLoad {
                path,
                reason: "file does not exist".to_string(),
            });
        }
        let config = checkpoint::config_for(&path)?;
        Ok(Self { path, config })
    }

    /// Accept either a record file or a model directory
    pub fn resolve<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            ModelLocator::new(path).locate()
        } else {
            Self::from_file(path)
        }
    }
}

/// Searches one directory for the model artifact
#[derive(Debug, Clone)]
pub struct ModelLocator {
    dir: PathBuf,
}

impl ModelLocator {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing candidate, without reading it
    pub fn find(&self) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|name| self.dir.join(name))
            .inspect(|path| debug!("Checking for model at {:?}", path))
            .find(|path| path.is_file())
    }

    /// Resolve the artifact and its architecture config
    pub fn locate(&self) -> Result<ModelArtifact> {
        let path = self.find().ok_or_else(|| CropDocError::ModelNotFound {
            dir: self.dir.clone(),
            candidates: CANDIDATES.iter().map(|s| s.to_string()).collect(),
        })?;
        info!("Using model artifact {:?}", path);

        let config = checkpoint::config_for(&path)?;
        Ok(ModelArtifact { path, config })
    }
}
