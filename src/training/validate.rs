//! Validation pass
//!
//! Runs a classifier over a dataset without gradients and builds the full
//! `Metrics` report.

use std::path::Path;

use burn::{data::dataloader::batcher::Batcher, tensor::backend::Backend};
use tracing::{debug, info};

use crate::dataset::{DatasetDescriptor, ImageFolder, LeafBatch, LeafBatcher, LeafDataset};
use crate::model::{check_input_size, checkpoint, PlantClassifier};
use crate::utils::error::{CropDocError, Result};
use crate::utils::metrics::Metrics;

/// Arg-max predictions and ground truth for every sample, in dataset order
pub fn predict_dataset<B: Backend>(
    model: &PlantClassifier<B>,
    dataset: &LeafDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let batcher = LeafBatcher::new(dataset.image_size());
    let mut predictions = Vec::with_capacity(dataset.samples().len());
    let mut ground_truth = Vec::with_capacity(dataset.samples().len());

    let len = dataset.samples().len();
    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let mut items = Vec::with_capacity(end - start);
        for index in start..end {
            if let Some(item) = dataset.load(index)? {
                items.push(item);
            }
        }
        if items.is_empty() {
            continue;
        }

        let n = items.len();
        let batch: LeafBatch<B> = batcher.batch(items, device);
        let output = model.forward(batch.images);
        let batch_predictions = output.argmax(1).reshape([n]);

        predictions.extend(
            batch_predictions
                .into_data()
                .iter::<i64>()
                .map(|p| p as usize),
        );
        ground_truth.extend(batch.targets.into_data().iter::<i64>().map(|t| t as usize));
    }

    debug!("Predicted {} validation samples", predictions.len());
    Ok((predictions, ground_truth))
}

/// Top-1 accuracy, P/R/F1 and the confusion matrix over `dataset`
pub fn evaluate<B: Backend>(
    model: &PlantClassifier<B>,
    dataset: &LeafDataset,
    batch_size: usize,
    class_names: &[String],
    device: &B::Device,
) -> Result<Metrics> {
    let (predictions, ground_truth) = predict_dataset(model, dataset, batch_size, device)?;
    Ok(Metrics::from_predictions(&predictions, &ground_truth, class_names.len())
        .with_class_names(class_names))
}

/// Validate a saved record against the val split of a dataset descriptor
pub fn validate_checkpoint<B: Backend>(
    record: &Path,
    data: &Path,
    image_size: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<Metrics> {
    check_input_size(image_size)?;
    let descriptor = DatasetDescriptor::from_file(data)?;
    let class_names = descriptor.class_names()?;
    let val = ImageFolder::scan(&descriptor.val, &class_names)?;
    if val.is_empty() {
        return Err(CropDocError::Dataset(format!(
            "no validation images under {}",
            descriptor.val.display()
        )));
    }

    let config = checkpoint::config_for(record)?;
    let model = checkpoint::load_classifier::<B>(record, &config, device)?;
    let outputs = model.output_classes();
    if outputs != class_names.len() {
        return Err(CropDocError::LabelMismatch {
            outputs,
            labels: class_names.len(),
        });
    }

    info!("Validating {:?} on {} images", record, val.len());
    let dataset = LeafDataset::from_folder(&val, image_size);
    evaluate(&model, &dataset, batch_size, &class_names, device)
}
