//! Checkpoint I/O
//!
//! A checkpoint is a `CompactRecorder` record (`.mpk`) plus an optional
//! `model_config.json` in the same directory describing the architecture.
//! Without the config file the default architecture is assumed.

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use tracing::{debug, info};

use super::cnn::{PlantClassifier, PlantClassifierConfig};
use crate::utils::error::{CropDocError, Result};

/// Architecture file written next to every saved record
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

fn sibling_config(record: &Path) -> PathBuf {
    record
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(MODEL_CONFIG_FILE)
}

/// Architecture for the record at `record`
pub fn config_for(record: &Path) -> Result<PlantClassifierConfig> {
    let path = sibling_config(record);
    if !path.exists() {
        debug!("No {} next to {:?}, using defaults", MODEL_CONFIG_FILE, record);
        return Ok(PlantClassifierConfig::new());
    }

    PlantClassifierConfig::load(&path).map_err(|e| CropDocError::ModelLoad {
        path: path.clone(),
        reason: format!("invalid model config: {}", e),
    })
}

/// Deserialize a record into a classifier built from `config`
pub fn load_classifier<B: Backend>(
    record: &Path,
    config: &PlantClassifierConfig,
    device: &B::Device,
) -> Result<PlantClassifier<B>> {
    if !record.is_file() {
        return Err(CropDocError::ModelLoad {
            path: record.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    info!("Loading model from {:?}", record);
    let recorder = CompactRecorder::new();
    PlantClassifier::new(config, device)
        .load_file(record, &recorder, device)
        .map_err(|e| CropDocError::ModelLoad {
            path: record.to_path_buf(),
            reason: format!("{:?}", e),
        })
}

/// Save `model` to `record` and its architecture to the sibling config file
pub fn save_classifier<B: Backend>(
    model: &PlantClassifier<B>,
    config: &PlantClassifierConfig,
    record: &Path,
) -> Result<()> {
    if let Some(parent) = record.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(record, &recorder)
        .map_err(|e| CropDocError::Serialization(format!("failed to save model: {:?}", e)))?;
    config.save(sibling_config(record))?;

    debug!("Saved model to {:?}", record);
    Ok(())
}
