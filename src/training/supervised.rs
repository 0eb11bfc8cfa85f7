//! Supervised fine-tuning loop
//!
//! A custom loop over Burn's optimizer API rather than the high-level
//! `LearnerBuilder`: shuffle, batch, step, then validate and checkpoint once
//! per epoch.

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::TrainConfig;
use super::early_stopping::EarlyStopping;
use super::run_dir::RunDir;
use super::validate::predict_dataset;
use crate::dataset::{LeafBatch, LeafBatcher, LeafDataset};
use crate::model::{save_classifier, PlantClassifier, PlantClassifierConfig};
use crate::utils::error::{CropDocError, Result};
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

/// One line of `history.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
    pub seconds: f64,
    pub is_best: bool,
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub history: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub best_val_accuracy: f64,
    pub stopped_early: bool,
}

/// Train `model` on `train`, checkpointing into `run` after every epoch
pub fn fit<B: AutodiffBackend>(
    mut model: PlantClassifier<B>,
    model_config: &PlantClassifierConfig,
    train: &LeafDataset,
    val: &LeafDataset,
    config: &TrainConfig,
    run: &RunDir,
    device: &B::Device,
) -> Result<FitOutcome> {
    let train_len = train.samples().len();
    if train_len == 0 {
        return Err(CropDocError::Training("training split is empty".into()));
    }

    let batcher = LeafBatcher::new(train.image_size());
    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut stopper = EarlyStopping::new(config.patience);
    let mut history = Vec::with_capacity(config.epochs);
    let mut stopped_early = false;

    let num_batches = train_len.div_ceil(config.batch);
    info!(
        "Training {} samples in {} batches of {} for up to {} epochs",
        train_len, num_batches, config.batch, config.epochs
    );

    for epoch in 1..=config.epochs {
        let started = Instant::now();
        let mut epoch_loss = RunningAverage::new();
        let mut train_acc = AccuracyTracker::new();

        let mut indices: Vec<usize> = (0..train_len).collect();
        indices.shuffle(&mut rng);

        for (batch_idx, chunk) in indices.chunks(config.batch).enumerate() {
            let mut items = Vec::with_capacity(chunk.len());
            for &index in chunk {
                if let Some(item) = train.load(index)? {
                    items.push(item);
                }
            }
            if items.is_empty() {
                continue;
            }

            let n = items.len();
            let batch: LeafBatch<B> = batcher.batch(items, device);

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(CropDocError::Training(format!(
                    "loss diverged to {} at epoch {}, batch {}",
                    loss_value,
                    epoch,
                    batch_idx + 1
                )));
            }
            epoch_loss.add(loss_value);

            let predictions: Vec<usize> = output
                .argmax(1)
                .reshape([n])
                .into_data()
                .iter::<i64>()
                .map(|p| p as usize)
                .collect();
            let targets: Vec<usize> = batch
                .targets
                .into_data()
                .iter::<i64>()
                .map(|t| t as usize)
                .collect();
            train_acc.add_batch(&predictions, &targets);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.lr, model, grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "Epoch {} batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                    epoch,
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    train_acc.accuracy() * 100.0
                );
            }
        }

        let val_accuracy = validation_accuracy(&model, val, config.batch, device)?;
        let is_best = stopper.update(epoch, val_accuracy);

        save_classifier(&model, model_config, &run.last())?;
        if is_best {
            save_classifier(&model, model_config, &run.best())?;
        }

        let record = EpochRecord {
            epoch,
            train_loss: epoch_loss.average(),
            train_accuracy: train_acc.accuracy(),
            val_accuracy,
            learning_rate: config.lr,
            seconds: started.elapsed().as_secs_f64(),
            is_best,
        };
        info!(
            "Epoch {}/{}: loss {:.4} | train acc {:.2}% | val acc {:.2}%{}",
            epoch,
            config.epochs,
            record.train_loss,
            record.train_accuracy * 100.0,
            record.val_accuracy * 100.0,
            if is_best { " (best)" } else { "" }
        );
        history.push(record);
        write_history(run, &history)?;

        if stopper.should_stop() {
            stopped_early = true;
            break;
        }
    }

    Ok(FitOutcome {
        history,
        best_epoch: stopper.best_epoch(),
        best_val_accuracy: stopper.best().unwrap_or(0.0),
        stopped_early,
    })
}

fn validation_accuracy<B: AutodiffBackend>(
    model: &PlantClassifier<B>,
    val: &LeafDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    let inner = model.valid();
    let (predictions, truth) = predict_dataset::<B::InnerBackend>(&inner, val, batch_size, device)?;
    let mut tracker = AccuracyTracker::new();
    tracker.add_batch(&predictions, &truth);
    Ok(tracker.accuracy())
}

fn write_history(run: &RunDir, history: &[EpochRecord]) -> Result<()> {
    let writer = BufWriter::new(File::create(run.history())?);
    serde_json::to_writer_pretty(writer, history)?;
    Ok(())
}
