//! `CropDocError`, returned by every fallible operation in the crate

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CropDocError {
    /// None of the candidate artifact files exist
    #[error("No model found in {}", dir.display())]
    ModelNotFound {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    /// The artifact exists but could not be deserialized
    #[error("Failed to load model from '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    /// The classifier head does not produce one score per label
    #[error("Model outputs {outputs} classes but the label list has {labels}")]
    LabelMismatch { outputs: usize, labels: usize },

    /// Arg-max landed outside the label list
    #[error("Predicted index {index} is out of range for {len} labels")]
    LabelOutOfRange { index: usize, len: usize },

    /// Uploaded bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Forward pass produced something unusable
    #[error("Inference error: {0}")]
    Inference(String),

    /// Missing split, empty split or unreadable sample
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Malformed dataset descriptor
    #[error("Invalid dataset descriptor '{}': {reason}", path.display())]
    Descriptor { path: PathBuf, reason: String },

    /// Non-finite loss or an invalid run setup
    #[error("Training error: {0}")]
    Training(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON, TOML or YAML (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CropDocError {
    fn from(err: serde_json::Error) -> Self {
        CropDocError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CropDocError>;
