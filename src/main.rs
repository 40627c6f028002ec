use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use referral_forecast::utils::io::{load_tables, write_feature_matrix, write_record_batch};
use referral_forecast::utils::logging::{create_spinner, finish_progress_bar};
use referral_forecast::{Config, LocalObjectStore, ModelRegistry, Pipeline, train};

#[derive(Parser)]
#[command(name = "referral-forecast")]
#[command(about = "Referral feature pipeline, training and scoring", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the feature pipeline and write the feature matrix
    Features {
        /// Parquet table directory or JSON request/export file
        #[arg(short, long)]
        input: PathBuf,

        /// Output Parquet file for features and target
        #[arg(short, long)]
        output: PathBuf,

        /// Optional Parquet file for the side table
        #[arg(long)]
        side: Option<PathBuf>,

        /// Use only the first N entries of a JSON export
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Train a model and save it to the registry
    Train {
        /// Parquet table directory or JSON request/export file
        #[arg(short, long)]
        input: PathBuf,

        /// Model registry directory
        #[arg(short, long)]
        registry: PathBuf,

        /// Save under this version instead of the next free one
        #[arg(long)]
        version: Option<u32>,

        /// Use only the first N entries of a JSON export
        #[arg(long)]
        limit: Option<usize>,

        /// Make the new model current
        #[arg(long)]
        set_current: bool,
    },

    /// Score referrals with the current model
    Score {
        /// Parquet table directory or JSON request file
        #[arg(short, long)]
        input: PathBuf,

        /// Model registry directory
        #[arg(short, long)]
        registry: PathBuf,

        /// Output JSON file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored model versions
    Models {
        /// Model registry directory
        #[arg(short, long)]
        registry: PathBuf,
    },

    /// Show the current-model status log
    Status {
        /// Model registry directory
        #[arg(short, long)]
        registry: PathBuf,
    },

    /// Make a stored model version current
    SetCurrent {
        /// Model registry directory
        #[arg(short, long)]
        registry: PathBuf,

        /// Version to make current
        version: u32,
    },
}

fn main() -> Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Features {
            input,
            output,
            side,
            limit,
        } => run_features(&config, &input, &output, side.as_deref(), limit),
        Commands::Train {
            input,
            registry,
            version,
            limit,
            set_current,
        } => run_train(&config, &input, &registry, version, limit, set_current),
        Commands::Score {
            input,
            registry,
            output,
        } => run_score(&input, &registry, output.as_deref()),
        Commands::Models { registry } => {
            let registry = open_registry(&registry)?;
            let models = registry.list_models()?;
            if models.is_empty() {
                println!("No models stored");
            }
            for (version, key) in models {
                println!("{version}\t{key}");
            }
            Ok(())
        }
        Commands::Status { registry } => {
            let registry = open_registry(&registry)?;
            for entry in registry.status()? {
                println!("{}\t{}", entry.timestamp, entry.current_version);
            }
            match registry.current_version() {
                Ok(version) => println!("current: {version}"),
                Err(e) => println!("current: none ({e})"),
            }
            Ok(())
        }
        Commands::SetCurrent { registry, version } => {
            let entry = open_registry(&registry)?.set_current(version)?;
            info!("Version {} is current as of {}", entry.current_version, entry.timestamp);
            Ok(())
        }
    }
}

fn open_registry(path: &Path) -> Result<ModelRegistry<LocalObjectStore>> {
    let store = LocalObjectStore::new(path)
        .with_context(|| format!("failed to open registry {}", path.display()))?;
    Ok(ModelRegistry::new(store))
}

fn run_features(
    config: &Config,
    input: &Path,
    output: &Path,
    side: Option<&Path>,
    limit: Option<usize>,
) -> Result<()> {
    info!("{}", config.pipeline);
    let tables = load_tables(input, limit)
        .with_context(|| format!("failed to load tables from {}", input.display()))?;

    let mut pipeline = Pipeline::new(&config.pipeline);
    let result = pipeline.fit_transform(tables)?;

    write_feature_matrix(output, &result.features, &result.target)?;
    if let Some(side_path) = side {
        write_record_batch(side_path, &result.side.to_record_batch()?)?;
        info!("Wrote side table to {}", side_path.display());
    }
    Ok(())
}

fn run_train(
    config: &Config,
    input: &Path,
    registry: &Path,
    version: Option<u32>,
    limit: Option<usize>,
    set_current: bool,
) -> Result<()> {
    let start = Instant::now();
    info!("{}", config.pipeline);
    info!("{}", config.training);

    let spinner = create_spinner(Some("Loading tables"));
    let tables = load_tables(input, limit)
        .with_context(|| format!("failed to load tables from {}", input.display()))?;
    finish_progress_bar(&spinner, Some("Tables loaded"));

    let outcome = train(tables, &config.pipeline, &config.training)?;
    if let Some(report) = &outcome.evaluation {
        println!("{}", serde_json::to_string_pretty(report)?);
    }

    let registry = open_registry(registry)?;
    let version = registry.save_trained(&outcome.model, version)?;
    if set_current {
        registry.set_current(version)?;
    }
    info!(
        "Trained model version {version} on {} rows in {:?}",
        outcome.rows,
        start.elapsed()
    );
    Ok(())
}

fn run_score(input: &Path, registry: &Path, output: Option<&Path>) -> Result<()> {
    let registry = open_registry(registry)?;
    let (version, model) = registry.load_current_model()?;
    info!("Scoring with model version {version}");

    let tables = load_tables(input, None)
        .with_context(|| format!("failed to load tables from {}", input.display()))?;
    let predictions = model.predict(tables)?;

    let json = serde_json::to_string_pretty(&predictions)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote {} predictions to {}", predictions.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
