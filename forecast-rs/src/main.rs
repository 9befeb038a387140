//! Batch forecasting CLI.
//!
//! Reads `<timestamp>,<history>` records, scores them with every model in a
//! bundle and writes one CSV row per record. Logs go to stderr so stdout
//! carries only the table.

use anyhow::Context;
use ash_forecast::{BatchForecaster, FeatureLayout, ForecastConfig, ModelBundle, RecordPolicy};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ash-forecast")]
#[command(about = "Multi-target batch forecasting over smoothed histories", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "forecast.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict every record of the input with every model in the bundle
    Predict {
        /// Model bundle manifest (TOML)
        #[arg(short, long)]
        models: PathBuf,
        /// Input file; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the smoothing factor
        #[arg(long)]
        alpha: Option<f64>,
        /// Skip malformed or short records instead of aborting
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Print the position and name of every feature
    Layout,
    /// Write a default config file
    Init,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Layout => load_config(&cli.config).and_then(|config| commands::layout(&config)),
        Commands::Predict {
            models,
            input,
            output,
            alpha,
            skip_invalid,
        } => load_config(&cli.config).and_then(|config| {
            commands::predict(config, &models, input, output, alpha, skip_invalid)
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Use the config file when present, defaults otherwise.
fn load_config(path: &Path) -> anyhow::Result<ForecastConfig> {
    if path.exists() {
        ForecastConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(ForecastConfig::default())
    }
}

mod commands {
    use super::*;

    pub fn init(config_path: &Path) -> anyhow::Result<()> {
        ForecastConfig::default().save(config_path)?;
        println!("Created default config at {}", config_path.display());
        Ok(())
    }

    pub fn layout(config: &ForecastConfig) -> anyhow::Result<()> {
        let layout = FeatureLayout::new(&config.features)?;
        println!("position,name");
        for (i, name) in layout.names().iter().enumerate() {
            println!("{},{}", i, name);
        }
        println!(
            "# {} features, histories need at least {} values",
            layout.len(),
            layout.max_shift()
        );
        Ok(())
    }

    pub fn predict(
        mut config: ForecastConfig,
        models: &Path,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        alpha: Option<f64>,
        skip_invalid: bool,
    ) -> anyhow::Result<()> {
        if let Some(alpha) = alpha {
            config.smoothing.alpha = alpha;
        }
        if skip_invalid {
            config.records.policy = RecordPolicy::Skip;
        }

        let bundle = ModelBundle::load(models)?;
        tracing::info!(targets = bundle.len(), "model bundle loaded");

        let forecaster = BatchForecaster::new(&bundle, &config)?;

        let reader: Box<dyn io::BufRead> = match &input {
            Some(path) => Box::new(BufReader::new(
                File::open(path).with_context(|| format!("opening {}", path.display()))?,
            )),
            None => Box::new(io::stdin().lock()),
        };
        let writer: Box<dyn io::Write> = match &output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            )),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };

        forecaster.run(reader, writer)?;
        Ok(())
    }
}
