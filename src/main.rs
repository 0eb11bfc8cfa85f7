//! cropdoc CLI
//!
//! Fine-tunes, validates and exports the plant classifier, and runs one-off
//! predictions against a model directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cropdoc::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use cropdoc::dataset::{default_labels, is_healthy, plant_name, DatasetDescriptor};
use cropdoc::inference::{ModelArtifact, Predictor};
use cropdoc::training::{self, TrainConfig};
use cropdoc::utils::format_duration;
use cropdoc::utils::logging::{init_logging, LogConfig};

/// Plant disease classification with Burn
#[derive(Parser, Debug)]
#[command(name = "cropdoc")]
#[command(version)]
#[command(about = "Train, validate, export and query the plant disease classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune a checkpoint, validate the best weights and export them
    Train(TrainArgs),

    /// Validate a saved model on the val split of a dataset
    Val {
        /// Model record (.mpk) or model directory
        #[arg(short, long)]
        weights: PathBuf,

        /// Dataset descriptor
        #[arg(short, long, default_value = "data.yaml")]
        data: PathBuf,

        #[arg(long, default_value = "640")]
        imgsz: usize,

        #[arg(short, long, default_value = "16")]
        batch: usize,
    },

    /// Export a saved model's weights to JSON
    Export {
        /// Model record (.mpk) or model directory
        #[arg(short, long)]
        weights: PathBuf,

        /// Output file
        #[arg(short, long, default_value = "model_export.json")]
        output: PathBuf,

        /// Take label names from this dataset descriptor instead of PlantVillage
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(long, default_value = "128")]
        imgsz: usize,
    },

    /// Classify one or more images
    Predict {
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Model record (.mpk) or model directory
        #[arg(short, long, default_value = ".")]
        model: PathBuf,

        /// Take label names from this dataset descriptor instead of PlantVillage
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(long, default_value = "128")]
        image_size: usize,

        /// Number of runner-up classes to show
        #[arg(long, default_value = "3")]
        top: usize,
    },
}

/// Flags override the TOML file, which overrides the defaults
#[derive(Args, Debug)]
struct TrainArgs {
    /// TOML file with training settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset descriptor
    #[arg(long)]
    data: Option<PathBuf>,

    /// Starting checkpoint
    #[arg(long)]
    weights: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch: Option<usize>,

    #[arg(long)]
    imgsz: Option<usize>,

    /// Epochs without improvement before stopping (0 disables)
    #[arg(long)]
    patience: Option<usize>,

    /// Run name
    #[arg(long)]
    name: Option<String>,

    /// Directory holding the runs
    #[arg(long)]
    project: Option<PathBuf>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Decode every image once up front
    #[arg(long)]
    cache: bool,

    /// Reuse an existing run directory
    #[arg(long)]
    exist_ok: bool,

    /// Start from fresh weights instead of the checkpoint
    #[arg(long)]
    scratch: bool,
}

impl TrainArgs {
    fn resolve(self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_toml_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = self.data {
            config.data = v;
        }
        if let Some(v) = self.weights {
            config.weights = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.batch {
            config.batch = v;
        }
        if let Some(v) = self.imgsz {
            config.imgsz = v;
        }
        if let Some(v) = self.patience {
            config.patience = v;
        }
        if let Some(v) = self.name {
            config.name = v;
        }
        if let Some(v) = self.project {
            config.project = v;
        }
        if let Some(v) = self.lr {
            config.lr = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        config.cache |= self.cache;
        config.exist_ok |= self.exist_ok;
        config.scratch |= self.scratch;

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LogConfig::from_verbosity(cli.verbose)) {
        eprintln!("{e}");
    }

    print_banner();

    match cli.command {
        Commands::Train(args) => cmd_train(args.resolve()?)?,
        Commands::Val {
            weights,
            data,
            imgsz,
            batch,
        } => cmd_val(&weights, &data, imgsz, batch)?,
        Commands::Export {
            weights,
            output,
            data,
            imgsz,
        } => cmd_export(&weights, &output, data.as_deref(), imgsz)?,
        Commands::Predict {
            images,
            model,
            data,
            image_size,
            top,
        } => cmd_predict(&images, &model, data.as_deref(), image_size, top)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        format!("cropdoc {} | backend: {}", cropdoc::VERSION, backend_name())
            .green()
            .bold()
    );
    println!();
}

fn labels_for(data: Option<&Path>) -> Result<Vec<String>> {
    match data {
        Some(path) => Ok(DatasetDescriptor::from_file(path)?.class_names()?),
        None => Ok(default_labels()),
    }
}

fn cmd_train(config: TrainConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Dataset:       {:?}", config.data);
    if config.scratch {
        println!("  Weights:       {}", "fresh (scratch)".yellow());
    } else {
        println!("  Weights:       {:?}", config.weights);
    }
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", config.batch);
    println!("  Image size:    {}", config.imgsz);
    println!("  Patience:      {}", config.patience);
    println!("  Learning rate: {}", config.lr);
    println!("  Run:           {:?}", config.project.join(&config.name));
    println!();

    let device = default_device();
    let summary = training::run::<TrainingBackend>(&config, &device)
        .context("training run failed")?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Epochs run:         {}{}",
        summary.epochs_run,
        if summary.stopped_early {
            " (stopped early)".yellow().to_string()
        } else {
            String::new()
        }
    );
    println!(
        "  Best val accuracy:  {:.2}% (epoch {})",
        summary.best_val_accuracy * 100.0,
        summary.best_epoch
    );
    println!("  Duration:           {}", format_duration(summary.seconds));
    println!();
    println!("{}", summary.metrics);
    println!();
    println!("  Run directory: {:?}", summary.run_dir);
    println!("  Best weights:  {:?}", summary.best_checkpoint);
    println!("  Export:        {:?}", summary.export_path);

    Ok(())
}

fn cmd_val(weights: &Path, data: &Path, imgsz: usize, batch: usize) -> Result<()> {
    let artifact = ModelArtifact::resolve(weights)?;
    println!("{}", format!("Validating {:?}...", artifact.path).cyan());

    let metrics = training::validate_checkpoint::<InferenceBackend>(
        &artifact.path,
        data,
        imgsz,
        batch,
        &default_device(),
    )?;

    println!();
    println!("{}", metrics);

    let weakest = metrics.weakest_classes(5);
    if !weakest.is_empty() {
        println!();
        println!("{}", "Weakest classes:".yellow());
        for class in weakest {
            println!(
                "  {:<40} F1 {:6.2}%  (support {})",
                class.class_name.as_deref().unwrap_or("?"),
                class.f1 * 100.0,
                class.support
            );
        }
    }
    Ok(())
}

fn cmd_export(weights: &Path, output: &Path, data: Option<&Path>, imgsz: usize) -> Result<()> {
    let artifact = ModelArtifact::resolve(weights)?;
    let labels = labels_for(data)?;

    println!("{}", format!("Exporting {:?}...", artifact.path).cyan());
    let exported = training::export_checkpoint::<InferenceBackend>(
        &artifact.path,
        &labels,
        imgsz,
        output,
        &default_device(),
    )?;

    println!(
        "  {} {} tensors, {} parameters -> {:?}",
        "Done:".green(),
        exported.tensors.len(),
        exported.parameter_count(),
        output
    );
    Ok(())
}

fn cmd_predict(
    images: &[PathBuf],
    model: &Path,
    data: Option<&Path>,
    image_size: usize,
    top: usize,
) -> Result<()> {
    let artifact = ModelArtifact::resolve(model)?;
    let labels = labels_for(data)?;

    println!("{}", "Loading model...".cyan());
    let predictor = Predictor::<InferenceBackend>::load_with_labels(
        &artifact,
        image_size,
        labels,
        &default_device(),
    )?;
    info!(
        "Loaded {:?} at {}px",
        predictor.source().path,
        predictor.image_size()
    );
    println!();

    for image in images {
        let prediction = predictor
            .predict_file(image)
            .with_context(|| format!("prediction failed for {}", image.display()))?;

        println!(
            "{}",
            image
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .bold()
        );
        println!(
            "  Predicted: {} ({:.2}%, {:.1} ms)",
            prediction.label.green(),
            prediction.confidence * 100.0,
            prediction.inference_time_ms
        );
        let condition = if is_healthy(&prediction.label) {
            "healthy".green()
        } else {
            "diseased".red()
        };
        println!("  Plant:     {} ({})", plant_name(&prediction.label), condition);
        for (index, probability) in prediction.top_k(top + 1).into_iter().skip(1) {
            let name = predictor
                .labels()
                .get(index)
                .map(String::as_str)
                .unwrap_or("?");
            println!("    {:<40} {:6.2}%", name, probability * 100.0);
        }
        println!();
    }
    Ok(())
}
