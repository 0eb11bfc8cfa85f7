//! Inference module
//!
//! This module provides:
//! - Lookup of the model artifact in a model directory
//! - Single-image prediction with the fixed label mapping

pub mod locator;
pub mod predictor;

// Re-export main types for convenience
pub use locator::{ModelArtifact, ModelLocator, CANDIDATES};
pub use predictor::{Prediction, Predictor};
