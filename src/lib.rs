//! # cropdoc
//!
//! Plant disease classification on the Burn framework.
//!
//! The crate backs two programs:
//!
//! - `cropdoc-server`: an HTTP service that classifies uploaded leaf images
//!   with a trained model artifact
//! - `cropdoc`: a CLI whose `train` command fine-tunes a checkpoint against a
//!   dataset descriptor, validates it and exports the weights
//!
//! ## Modules
//!
//! - `dataset`: label list, dataset descriptor, image-folder scanning and preprocessing
//! - `model`: the CNN and its checkpoint format
//! - `inference`: artifact lookup and single-image prediction
//! - `training`: fine-tuning loop, validation, early stopping and export
//! - `utils`: errors, logging and evaluation metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cropdoc::backend::{default_device, InferenceBackend};
//! use cropdoc::inference::{ModelLocator, Predictor};
//!
//! let artifact = ModelLocator::new("models").locate()?;
//! let predictor = Predictor::<InferenceBackend>::load(&artifact, 128, &default_device())?;
//! let prediction = predictor.predict_bytes(&std::fs::read("leaf.jpg")?)?;
//! println!("{}", prediction.label);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{CLASS_NAMES, NUM_CLASSES};
pub use inference::{ModelArtifact, ModelLocator, Prediction, Predictor};
pub use model::cnn::{PlantClassifier, PlantClassifierConfig};
pub use training::{TrainConfig, TrainSummary};
pub use utils::error::{CropDocError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Square input resolution the service resizes uploads to
pub const IMAGE_SIZE: usize = 128;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
