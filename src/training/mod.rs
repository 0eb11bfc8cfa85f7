//! Training module
//!
//! The training driver is a straight line: resolve the dataset, load the
//! starting checkpoint, fine-tune, validate the best weights and export them.
//! Any failure aborts the run.

pub mod config;
pub mod early_stopping;
pub mod export;
pub mod run_dir;
pub mod supervised;
pub mod validate;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::{DatasetDescriptor, ImageFolder, LeafDataset};
use crate::inference::ModelArtifact;
use crate::model::{checkpoint, PlantClassifier, PlantClassifierConfig};
use crate::utils::error::{CropDocError, Result};
use crate::utils::metrics::Metrics;

// Re-export main types for convenience
pub use config::TrainConfig;
pub use early_stopping::EarlyStopping;
pub use export::{export_checkpoint, export_model, ExportedModel, ExportedTensor};
pub use run_dir::RunDir;
pub use supervised::{fit, EpochRecord, FitOutcome};
pub use validate::{evaluate, predict_dataset, validate_checkpoint};

/// What a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    pub run_dir: PathBuf,
    pub best_checkpoint: PathBuf,
    pub export_path: PathBuf,
    pub class_names: Vec<String>,
    /// RFC 3339 local start time
    pub started_at: String,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_accuracy: f64,
    pub stopped_early: bool,
    pub seconds: f64,
    pub metrics: Metrics,
}

/// Starting weights: the checkpoint, or fresh ones with `scratch`
///
/// A checkpoint whose head width differs from `num_classes` keeps its
/// backbone and gets a new head.
fn initial_model<B: AutodiffBackend>(
    config: &TrainConfig,
    num_classes: usize,
    device: &B::Device,
) -> Result<(PlantClassifier<B>, PlantClassifierConfig)> {
    if config.scratch {
        info!("Starting from freshly initialized weights");
        let model_config = PlantClassifierConfig::new()
            .with_num_classes(num_classes)
            .with_input_size(config.imgsz);
        return Ok((PlantClassifier::new(&model_config, device), model_config));
    }

    let artifact = ModelArtifact::from_file(&config.weights)?;
    let mut model = checkpoint::load_classifier::<B>(&artifact.path, &artifact.config, device)?;
    let mut model_config = artifact.config.with_input_size(config.imgsz);

    let outputs = model.output_classes();
    if outputs != num_classes {
        warn!(
            "Checkpoint predicts {} classes, dataset has {}: replacing the classification head",
            outputs, num_classes
        );
        model = model.with_num_classes(num_classes, device);
        model_config = model_config.with_num_classes(num_classes);
    }

    Ok((model, model_config))
}

/// Run the whole training procedure
pub fn run<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<TrainSummary> {
    let started = Instant::now();
    let started_at = Local::now().to_rfc3339();
    config.validate()?;

    // 1. Dataset
    let descriptor = DatasetDescriptor::from_file(&config.data)?;
    let class_names = descriptor.class_names()?;
    info!("Dataset has {} classes", class_names.len());

    let train_split = ImageFolder::scan(&descriptor.train, &class_names)?;
    let val_split = ImageFolder::scan(&descriptor.val, &class_names)?;
    if train_split.is_empty() {
        return Err(CropDocError::Dataset(format!(
            "no training images under {}",
            descriptor.train.display()
        )));
    }
    if val_split.is_empty() {
        return Err(CropDocError::Dataset(format!(
            "no validation images under {}",
            descriptor.val.display()
        )));
    }

    for (name, count) in class_names.iter().zip(train_split.class_counts()) {
        if count == 0 {
            warn!("Class '{}' has no training images", name);
        }
    }

    // 2. Starting weights
    let (model, model_config) = initial_model::<B>(config, class_names.len(), device)?;

    // 3. Run directory
    let run = RunDir::create(&config.project, &config.name, config.exist_ok)?;
    config.save_toml(&run.args())?;

    // 4. Fine-tune
    let (train, val) = if config.cache {
        (
            LeafDataset::cached(train_split.samples.clone(), config.imgsz)?,
            LeafDataset::cached(val_split.samples.clone(), config.imgsz)?,
        )
    } else {
        (
            LeafDataset::from_folder(&train_split, config.imgsz),
            LeafDataset::from_folder(&val_split, config.imgsz),
        )
    };
    info!(
        "{} training / {} validation images{}",
        train_split.len(),
        val_split.len(),
        if train.is_cached() { ", cached in memory" } else { "" }
    );
    let outcome = supervised::fit(model, &model_config, &train, &val, config, &run, device)?;

    // 5. Validate the best weights
    let best = checkpoint::load_classifier::<B>(&run.best(), &model_config, device)?.valid();
    let metrics = evaluate(&best, &val, config.batch, &class_names, device)?;
    info!("{}", metrics);
    serde_json::to_writer_pretty(BufWriter::new(File::create(run.val_metrics())?), &metrics)?;

    // 6. Export
    export_model(&best, &model_config, &class_names, config.imgsz, &run.export())?;

    Ok(TrainSummary {
        run_dir: run.root().to_path_buf(),
        best_checkpoint: run.best(),
        export_path: run.export(),
        class_names,
        started_at,
        epochs_run: outcome.history.len(),
        best_epoch: outcome.best_epoch,
        best_val_accuracy: outcome.best_val_accuracy,
        stopped_early: outcome.stopped_early,
        seconds: started.elapsed().as_secs_f64(),
        metrics,
    })
}
