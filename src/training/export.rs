//! Weight export
//!
//! Writes every named tensor of a classifier to a single JSON document,
//! together with the label names and input resolution, so the weights can be
//! loaded by tooling outside Burn.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::cnn::ConvBlock;
use crate::model::{check_input_size, checkpoint, PlantClassifier, PlantClassifierConfig};
use crate::utils::error::{CropDocError, Result};

/// Identifies the document layout
pub const EXPORT_FORMAT: &str = "cropdoc-weights-v1";

/// One tensor, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedModel {
    pub format: String,
    pub input_size: usize,
    pub labels: Vec<String>,
    pub config: PlantClassifierConfig,
    /// Keyed `conv1.conv.weight`, `conv1.bn.running_mean`, `fc2.bias`, ...
    pub tensors: BTreeMap<String, ExportedTensor>,
}

impl ExportedModel {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(|t| t.data.len()).sum()
    }
}

fn tensor_to_data<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ExportedTensor> {
    let shape = tensor.dims().to_vec();
    let data = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CropDocError::Export(format!("{:?}", e)))?;
    Ok(ExportedTensor { shape, data })
}

fn push_conv_block<B: Backend>(
    tensors: &mut BTreeMap<String, ExportedTensor>,
    prefix: &str,
    block: &ConvBlock<B>,
) -> Result<()> {
    tensors.insert(
        format!("{prefix}.conv.weight"),
        tensor_to_data(block.conv.weight.val())?,
    );
    if let Some(bias) = &block.conv.bias {
        tensors.insert(format!("{prefix}.conv.bias"), tensor_to_data(bias.val())?);
    }
    tensors.insert(format!("{prefix}.bn.gamma"), tensor_to_data(block.bn.gamma.val())?);
    tensors.insert(format!("{prefix}.bn.beta"), tensor_to_data(block.bn.beta.val())?);
    tensors.insert(
        format!("{prefix}.bn.running_mean"),
        tensor_to_data(block.bn.running_mean.value())?,
    );
    tensors.insert(
        format!("{prefix}.bn.running_var"),
        tensor_to_data(block.bn.running_var.value())?,
    );
    Ok(())
}

/// Collect every tensor of the model by name
pub fn named_tensors<B: Backend>(
    model: &PlantClassifier<B>,
) -> Result<BTreeMap<String, ExportedTensor>> {
    let mut tensors = BTreeMap::new();
    push_conv_block(&mut tensors, "conv1", &model.conv1)?;
    push_conv_block(&mut tensors, "conv2", &model.conv2)?;
    push_conv_block(&mut tensors, "conv3", &model.conv3)?;
    push_conv_block(&mut tensors, "conv4", &model.conv4)?;

    for (name, linear) in [("fc1", &model.fc1), ("fc2", &model.fc2)] {
        tensors.insert(format!("{name}.weight"), tensor_to_data(linear.weight.val())?);
        if let Some(bias) = &linear.bias {
            tensors.insert(format!("{name}.bias"), tensor_to_data(bias.val())?);
        }
    }
    Ok(tensors)
}

/// Write `model` to `output` as JSON
pub fn export_model<B: Backend>(
    model: &PlantClassifier<B>,
    config: &PlantClassifierConfig,
    labels: &[String],
    input_size: usize,
    output: &Path,
) -> Result<ExportedModel> {
    check_input_size(input_size)?;
    let outputs = model.output_classes();
    if outputs != labels.len() {
        return Err(CropDocError::LabelMismatch {
            outputs,
            labels: labels.len(),
        });
    }

    let exported = ExportedModel {
        format: EXPORT_FORMAT.to_string(),
        input_size,
        labels: labels.to_vec(),
        config: config.clone(),
        tensors: named_tensors(model)?,
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer(writer, &exported)
        .map_err(|e| CropDocError::Export(format!("failed to write {}: {e}", output.display())))?;

    info!(
        "Exported {} tensors ({} parameters) to {:?}",
        exported.tensors.len(),
        exported.parameter_count(),
        output
    );
    Ok(exported)
}

/// Load a saved record and export it
pub fn export_checkpoint<B: Backend>(
    record: &Path,
    labels: &[String],
    input_size: usize,
    output: &Path,
    device: &B::Device,
) -> Result<ExportedModel> {
    let config = checkpoint::config_for(record)?;
    let model = checkpoint::load_classifier::<B>(record, &config, device)?;
    export_model(&model, &config, labels, input_size, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend};
    use tempfile::TempDir;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn test_export_contains_all_layers() {
        let dir = TempDir::new().unwrap();
        let device = default_device();
        let config = PlantClassifierConfig::new()
            .with_base_filters(2)
            .with_num_classes(3);
        let model = PlantClassifier::<InferenceBackend>::new(&config, &device);
        let output = dir.path().join("weights").join("best.json");

        export_model(&model, &config, &labels(3), 64, &output).unwrap();
        let exported = ExportedModel::from_file(&output).unwrap();

        assert_eq!(exported.format, EXPORT_FORMAT);
        assert_eq!(exported.input_size, 64);
        assert_eq!(exported.labels, labels(3));
        // 4 conv blocks x 6 tensors + 2 linear x 2 tensors
        assert_eq!(exported.tensors.len(), 28);
        assert_eq!(exported.tensors["conv1.conv.weight"].shape, vec![2, 3, 3, 3]);
        assert_eq!(exported.tensors["fc2.weight"].shape, vec![256, 3]);
        for tensor in exported.tensors.values() {
            assert_eq!(tensor.data.len(), tensor.shape.iter().product::<usize>());
        }
    }

    #[test]
    fn test_export_rejects_unusable_input_size() {
        let dir = TempDir::new().unwrap();
        let device = default_device();
        let config = PlantClassifierConfig::new()
            .with_base_filters(2)
            .with_num_classes(3);
        let model = PlantClassifier::<InferenceBackend>::new(&config, &device);
        let output = dir.path().join("x.json");

        let err = export_model(&model, &config, &labels(3), 8, &output).unwrap_err();
        assert!(matches!(err, CropDocError::Config(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_export_rejects_label_mismatch() {
        let dir = TempDir::new().unwrap();
        let device = default_device();
        let config = PlantClassifierConfig::new().with_base_filters(2);
        let model = PlantClassifier::<InferenceBackend>::new(&config, &device);

        let err = export_model(&model, &config, &labels(4), 64, &dir.path().join("x.json"))
            .unwrap_err();
        assert!(matches!(err, CropDocError::LabelMismatch { .. }));
    }
}
