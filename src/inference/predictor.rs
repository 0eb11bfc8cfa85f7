//! Inference Predictor Module
//!
//! Wraps a loaded classifier with the preprocessing contract and the label
//! list, turning image bytes into a labelled prediction.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::locator::ModelArtifact;
use crate::dataset::{default_labels, preprocess};
use crate::model::{check_input_size, checkpoint, PlantClassifier};
use crate::utils::error::{CropDocError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index
    pub class_index: usize,

    /// Predicted class name
    pub label: String,

    /// Softmax probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl Prediction {
    /// Build a prediction from a probability row
    ///
    /// Exactly equal maxima resolve to the lowest index; NaN never wins.
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        labels: &[String],
        elapsed: Duration,
    ) -> Result<Self> {
        let class_index = argmax(&probabilities);
        let confidence = probabilities.get(class_index).copied().unwrap_or(0.0);
        let label = labels
            .get(class_index)
            .ok_or(CropDocError::LabelOutOfRange {
                index: class_index,
                len: labels.len(),
            })?
            .clone();

        Ok(Self {
            class_index,
            label,
            confidence,
            probabilities,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }

    /// Top-k (index, probability) pairs, highest first
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut indexed: Vec<(usize, f32)> =
            self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        indexed.truncate(k);
        indexed
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        // strict comparison keeps the first of equal maxima
        if v > values[best] || (values[best].is_nan() && !v.is_nan()) {
            best = i;
        }
    }
    best
}

/// A loaded model plus everything needed to serve it
#[derive(Debug)]
pub struct Predictor<B: Backend> {
    model: PlantClassifier<B>,
    device: B::Device,
    image_size: usize,
    labels: Vec<String>,
    source: ModelArtifact,
}

impl<B: Backend> Predictor<B> {
    /// Load an artifact against the PlantVillage label list
    pub fn load(artifact: &ModelArtifact, image_size: usize, device: &B::Device) -> Result<Self> {
        Self::load_with_labels(artifact, image_size, default_labels(), device)
    }

    /// Load an artifact against a custom label list
    ///
    /// Fails with `LabelMismatch` unless the model has one output per label.
    pub fn load_with_labels(
        artifact: &ModelArtifact,
        image_size: usize,
        labels: Vec<String>,
        device: &B::Device,
    ) -> Result<Self> {
        check_input_size(image_size)?;
        let start = Instant::now();
        let model = checkpoint::load_classifier::<B>(&artifact.path, &artifact.config, device)?;

        let outputs = model.output_classes();
        if outputs != labels.len() {
            return Err(CropDocError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }

        info!(
            "Model ready: {} classes, {}px input, loaded in {:.1?}",
            outputs,
            image_size,
            start.elapsed()
        );

        Ok(Self {
            model,
            device: device.clone(),
            image_size,
            labels,
            source: artifact.clone(),
        })
    }

    /// Decode uploaded bytes and classify them
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = preprocess::decode(bytes)?;
        self.predict_input(preprocess::image_to_input(&image, self.image_size as u32))
    }

    /// Classify an image file
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        self.predict_input(preprocess::load_input(path, self.image_size as u32)?)
    }

    /// Classify an already preprocessed CHW input
    pub fn predict_input(&self, input: Vec<f32>) -> Result<Prediction> {
        let size = self.image_size;
        let expected = 3 * size * size;
        if input.len() != expected {
            return Err(CropDocError::Inference(format!(
                "expected {} input values, got {}",
                expected,
                input.len()
            )));
        }

        let start = Instant::now();
        let tensor =
            Tensor::<B, 4>::from_data(TensorData::new(input, [1, 3, size, size]), &self.device);
        let probabilities = self
            .model
            .forward_softmax(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CropDocError::Inference(format!("{:?}", e)))?;
        let elapsed = start.elapsed();

        let prediction = Prediction::from_probabilities(probabilities, &self.labels, elapsed)?;
        debug!(
            "Predicted {} ({:.3}) in {:.2} ms",
            prediction.label, prediction.confidence, prediction.inference_time_ms
        );
        Ok(prediction)
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The artifact this predictor was loaded from
    pub fn source(&self) -> &ModelArtifact {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend};
    use crate::inference::ModelLocator;
    use crate::model::{save_classifier, PlantClassifierConfig};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    fn save_tiny_model(dir: &Path, num_classes: usize) {
        let config = PlantClassifierConfig::new()
            .with_base_filters(2)
            .with_num_classes(num_classes);
        let model = PlantClassifier::<InferenceBackend>::new(&config, &default_device());
        save_classifier(&model, &config, &dir.join("best_model.mpk")).unwrap();
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(50, 30, |x, y| image::Rgb([x as u8 * 5, y as u8 * 8, 90]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_tie_resolves_to_lowest_index() {
        let p = Prediction::from_probabilities(
            vec![0.1, 0.4, 0.4, 0.1],
            &labels(4),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(p.class_index, 1);
        assert_eq!(p.label, "class_1");
    }

    #[test]
    fn test_nan_never_wins() {
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.7]), 2);
        assert_eq!(argmax(&[0.3, f32::NAN, 0.1]), 0);
    }

    #[test]
    fn test_index_beyond_labels_is_an_error() {
        let err = Prediction::from_probabilities(vec![0.1, 0.2, 0.7], &labels(2), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, CropDocError::LabelOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn test_top_k_order() {
        let p = Prediction::from_probabilities(vec![0.2, 0.5, 0.3], &labels(3), Duration::ZERO)
            .unwrap();
        assert_eq!(p.top_k(2), vec![(1, 0.5), (2, 0.3)]);
    }

    #[test]
    fn test_predict_bytes_returns_known_label() {
        let dir = TempDir::new().unwrap();
        save_tiny_model(dir.path(), 38);

        let artifact = ModelLocator::new(dir.path()).locate().unwrap();
        let predictor = Predictor::<InferenceBackend>::load(&artifact, 32, &default_device()).unwrap();

        let prediction = predictor.predict_bytes(&png_bytes()).unwrap();
        assert!(crate::CLASS_NAMES.contains(&prediction.label.as_str()));
        assert_eq!(prediction.probabilities.len(), 38);
        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_bytes_same_prediction() {
        let dir = TempDir::new().unwrap();
        save_tiny_model(dir.path(), 38);

        let artifact = ModelLocator::new(dir.path()).locate().unwrap();
        let predictor = Predictor::<InferenceBackend>::load(&artifact, 32, &default_device()).unwrap();

        let bytes = png_bytes();
        let a = predictor.predict_bytes(&bytes).unwrap();
        let b = predictor.predict_bytes(&bytes).unwrap();
        assert_eq!(a.class_index, b.class_index);
        assert_eq!(a.probabilities, b.probabilities);
    }

    #[test]
    fn test_head_width_must_match_labels() {
        let dir = TempDir::new().unwrap();
        save_tiny_model(dir.path(), 5);

        let artifact = ModelLocator::new(dir.path()).locate().unwrap();
        let err = Predictor::<InferenceBackend>::load(&artifact, 32, &default_device()).unwrap_err();
        assert!(matches!(
            err,
            CropDocError::LabelMismatch {
                outputs: 5,
                labels: 38
            }
        ));

        let custom =
            Predictor::<InferenceBackend>::load_with_labels(&artifact, 32, labels(5), &default_device());
        assert!(custom.is_ok());
    }

    #[test]
    fn test_input_below_pooling_depth_is_rejected_at_load() {
        let dir = TempDir::new().unwrap();
        save_tiny_model(dir.path(), 38);
        let artifact = ModelLocator::new(dir.path()).locate().unwrap();

        for size in [0, 4, 8, 15] {
            let err = Predictor::<InferenceBackend>::load(&artifact, size, &default_device())
                .err()
                .unwrap();
            assert!(matches!(err, CropDocError::Config(_)), "size {size}");
        }

        let smallest =
            Predictor::<InferenceBackend>::load(&artifact, 16, &default_device()).unwrap();
        assert_eq!(smallest.image_size(), 16);
        assert_eq!(smallest.source().path, artifact.path);
        assert!(smallest.predict_bytes(&png_bytes()).is_ok());
    }

    #[test]
    fn test_undecodable_bytes() {
        let dir = TempDir::new().unwrap();
        save_tiny_model(dir.path(), 38);

        let artifact = ModelLocator::new(dir.path()).locate().unwrap();
        let predictor = Predictor::<InferenceBackend>::load(&artifact, 32, &default_device()).unwrap();

        let err = predictor.predict_bytes(b"GIF89a but not really").unwrap_err();
        assert!(matches!(err, CropDocError::ImageDecode(_)));
    }
}
