//! Jaundice Detection CLI
//!
//! Entry point for training, evaluating and serving the jaundice classifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use jaundice_detect::artifact::ArtifactStore;
use jaundice_detect::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use jaundice_detect::config::{ServeConfig, TrainingConfig};
use jaundice_detect::dataset::DatasetSplits;
use jaundice_detect::inference::{ImageUpload, ItemOutcome};
use jaundice_detect::server::{self, AppState};
use jaundice_detect::training::{evaluate_artifact, run_training};
use jaundice_detect::utils::{format_confidence, format_duration};
use jaundice_detect::utils::logging::{init_logging, LogConfig};

/// Jaundice vs. normal image classification
///
/// Trains a two-phase transfer-learning classifier, calibrates its decision
/// threshold and serves predictions over HTTP.
#[derive(Parser, Debug)]
#[command(name = "jaundice_detect")]
#[command(version)]
#[command(about = "Jaundice detection with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, calibrate and save a model
    Train {
        /// TOML or JSON training config; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root with train/, validate/ and test/
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Artifact directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Epoch budget of the head-only phase
        #[arg(long)]
        epochs_phase1: Option<usize>,

        /// Epoch budget of the fine-tuning phase
        #[arg(long)]
        epochs_phase2: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Pretrained weights for the backbone
        #[arg(long)]
        backbone: Option<PathBuf>,
    },

    /// Score the test split with a saved model at its stored threshold
    Evaluate {
        #[arg(short, long, env = "MODEL_DIR", default_value = "models")]
        model_dir: PathBuf,

        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },

    /// Classify one or more images
    Predict {
        #[arg(short, long, env = "MODEL_DIR", default_value = "models")]
        model_dir: PathBuf,

        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print the result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show the metrics record of a saved model
    Info {
        #[arg(short, long, env = "MODEL_DIR", default_value = "models")]
        model_dir: PathBuf,
    },

    /// Show dataset statistics
    Stats {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },

    /// Serve the HTTP API
    Serve {
        #[arg(short, long, env = "MODEL_DIR", default_value = "models")]
        model_dir: PathBuf,

        #[arg(long, env = "JAUNDICE_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, env = "PORT", default_value = "5000")]
        port: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = match (&cli.command, cli.verbose) {
        (_, true) => LogConfig::verbose(),
        (Commands::Serve { .. }, false) => LogConfig::production(),
        _ => LogConfig::default(),
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            output_dir,
            epochs_phase1,
            epochs_phase2,
            batch_size,
            seed,
            backbone,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("loading training config {:?}", path))?,
                None => TrainingConfig::default(),
            };

            if let Some(v) = data_dir {
                training_config.data_dir = v;
            }
            if let Some(v) = output_dir {
                training_config.output_dir = v;
            }
            if let Some(v) = epochs_phase1 {
                training_config.epochs_phase1 = v;
            }
            if let Some(v) = epochs_phase2 {
                training_config.epochs_phase2 = v;
            }
            if let Some(v) = batch_size {
                training_config.batch_size = v;
            }
            if let Some(v) = seed {
                training_config.seed = v;
            }
            if backbone.is_some() {
                training_config.backbone_path = backbone;
            }

            cmd_train(&training_config)?;
        }

        Commands::Evaluate {
            model_dir,
            data_dir,
            batch_size,
        } => {
            cmd_evaluate(&model_dir, &data_dir, batch_size)?;
        }

        Commands::Predict { model_dir, images, json } => {
            cmd_predict(&model_dir, &images, json)?;
        }

        Commands::Info { model_dir } => {
            cmd_info(&model_dir)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }

        Commands::Serve { model_dir, host, port } => {
            cmd_serve(ServeConfig { host, port, model_dir })?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------+
 |   Jaundice Detection                              |
 |   Two-phase transfer learning with Burn + Rust    |
 +--------------------------------------------------+
  "#
        .yellow()
    );
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Training on {} with data from {:?}", backend_name(), config.data_dir);

    let outcome = run_training::<TrainingBackend>(config, default_device())?;

    println!();
    println!("{}", "Training Complete".green().bold());
    for phase in &outcome.report.phases {
        println!(
            "  {:<10} {:>3} epochs, final lr {:.2e}, {:?}",
            phase.phase.name(),
            phase.epochs_run,
            phase.final_learning_rate,
            phase.stop_reason
        );
    }
    if let Some(best) = outcome.report.best_val_accuracy() {
        println!("  Best val accuracy: {:.2}%", best * 100.0);
    }
    println!("  Duration: {}", format_duration(outcome.report.duration_secs));

    println!();
    println!("{}", "Calibration".cyan().bold());
    println!("  Threshold: {:.4}", outcome.calibration.threshold);
    match outcome.calibration.auc {
        Some(auc) => println!("  ROC AUC:   {:.4}", auc),
        None => println!("  ROC AUC:   N/A"),
    }
    println!();
    println!("{}", outcome.record);
    println!("Artifact written to {:?}", config.output_dir);

    Ok(())
}

fn cmd_evaluate(model_dir: &Path, data_dir: &Path, batch_size: usize) -> Result<()> {
    info!("Evaluating {:?} on {:?}", model_dir, data_dir);

    let evaluation = evaluate_artifact::<InferenceBackend>(model_dir, data_dir, batch_size, default_device())?;

    println!("{}", "Test Split Evaluation".cyan().bold());
    println!("  Threshold: {:.4}", evaluation.threshold);
    println!("{}", evaluation.metrics);

    Ok(())
}

fn cmd_predict(model_dir: &Path, images: &[PathBuf], json: bool) -> Result<()> {
    let state = AppState::for_artifact::<InferenceBackend>(ArtifactStore::new(model_dir), default_device());
    let service = &state.service;

    if let [path] = images {
        let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let result = service.predict(&bytes, path.file_name().and_then(|n| n.to_str()))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            let verdict = if result.is_jaundice() {
                result.prediction.to_string().red().bold()
            } else {
                result.prediction.to_string().green().bold()
            };
            println!("{}: {} ({} confidence)", path.display(), verdict, format_confidence(result.confidence));
            println!(
                "  P(jaundice) = {:.4}, P(normal) = {:.4}",
                result.probability_jaundice, result.probability_normal
            );
        }
        return Ok(());
    }

    let mut uploads = Vec::with_capacity(images.len());
    for path in images {
        let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        uploads.push(ImageUpload::new(filename, bytes));
    }

    let batch = service.predict_batch(&uploads)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    for item in &batch.results {
        match &item.outcome {
            ItemOutcome::Success(result) => println!(
                "{:<32} {:<9} {}",
                item.filename,
                result.prediction.to_string(),
                format_confidence(result.confidence)
            ),
            ItemOutcome::Error { error } => println!("{:<32} {} {}", item.filename, "error".red(), error),
        }
    }
    println!("{}/{} images classified", batch.successful, batch.total);

    Ok(())
}

fn cmd_info(model_dir: &Path) -> Result<()> {
    let store = ArtifactStore::new(model_dir);
    if !store.has_model() {
        bail!("No trained model in {:?}; run `jaundice_detect train` first", model_dir);
    }

    let config = store.load_config()?;
    println!("{}", "Model".cyan().bold());
    println!("  Input:  {}x{}x3", config.input_size, config.input_size);
    println!("  Stages: {:?}", config.stage_filters);
    println!();

    match store.load_metrics()? {
        Some(record) => println!("{}", record),
        None => println!("{} No metrics record in {:?}", "Note:".yellow(), model_dir),
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        println!("{} Dataset directory not found: {:?}", "Error:".red(), data_dir);
        println!();
        println!("Expected layout:");
        println!("  {}/train/{{normal,jaundice}}/", data_dir.display());
        println!("  {}/validate/{{normal,jaundice}}/", data_dir.display());
        println!("  {}/test/{{normal,jaundice}}/", data_dir.display());
        return Ok(());
    }

    let splits = DatasetSplits::load(data_dir)?;
    splits.stats().print();

    Ok(())
}

fn cmd_serve(config: ServeConfig) -> Result<()> {
    info!("Serving on {} from {:?}", backend_name(), config.model_dir);

    let state = Arc::new(AppState::for_artifact::<InferenceBackend>(
        ArtifactStore::new(&config.model_dir),
        default_device(),
    ));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(&config, state))?;

    Ok(())
}
