//! Training configuration
//!
//! Defaults reproduce the fixed fine-tuning recipe. A TOML file may override
//! any subset of fields; the CLI applies its flags on top.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::check_input_size;
use crate::utils::error::{CropDocError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Dataset descriptor
    pub data: PathBuf,
    /// Checkpoint to start from
    pub weights: PathBuf,
    pub epochs: usize,
    pub batch: usize,
    /// Square training resolution
    pub imgsz: usize,
    /// Epochs without improvement before stopping; 0 disables
    pub patience: usize,
    /// Run name under `project`
    pub name: String,
    pub project: PathBuf,
    pub lr: f64,
    pub weight_decay: f64,
    pub seed: u64,
    /// Decode every image once before the first epoch
    pub cache: bool,
    /// Reuse `project/name` instead of picking a fresh suffix
    pub exist_ok: bool,
    /// Ignore `weights` and start from a fresh model
    pub scratch: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data.yaml"),
            weights: PathBuf::from("pretrained_model.mpk"),
            epochs: 50,
            batch: 16,
            imgsz: 640,
            patience: 20,
            name: "ripeness_model".to_string(),
            project: PathBuf::from("runs"),
            lr: 1e-3,
            weight_decay: 1e-4,
            seed: 42,
            cache: false,
            exist_ok: false,
            scratch: false,
        }
    }
}

impl TrainConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CropDocError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            CropDocError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Write the resolved configuration, as recorded in each run directory
    pub fn save_toml(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CropDocError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(CropDocError::Config("epochs must be at least 1".into()));
        }
        if self.batch == 0 {
            return Err(CropDocError::Config("batch must be at least 1".into()));
        }
        check_input_size(self.imgsz)?;
        if self.lr.is_nan() || self.lr <= 0.0 {
            return Err(CropDocError::Config(format!("lr must be positive, got {}", self.lr)));
        }
        if self.name.is_empty() {
            return Err(CropDocError::Config("name must not be empty".into()));
        }
        Ok(())
    }
}
