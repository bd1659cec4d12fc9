use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use steg_core::{PipelineConfig, PipelineConfigBuilder};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "steganalyse")]
#[command(about = "Detect steganography in images and videos with SVM and logistic regression classifiers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify images and videos with the trained classifiers
    #[command(group(ArgGroup::new("input").args(["filenames", "text_file"])))]
    Classify {
        /// Files to classify
        #[arg(short, long, num_args = 1..)]
        filenames: Vec<PathBuf>,

        /// Text file listing one path per line
        #[arg(short, long)]
        text_file: Option<PathBuf>,

        /// Directory holding the classifier artifacts
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Where to write the results CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build feature tables from a labelled directory and train the classifiers
    Train {
        /// Root containing images/{stego,clean} and videos/{stego,clean}
        dir: PathBuf,

        /// Seed for the train/test split
        #[arg(long)]
        seed: Option<u64>,

        /// Directory receiving the classifier artifacts
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Text };
    let base = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    debug!("Base configuration: {:?}", base);

    match cli.command {
        Commands::Classify {
            filenames,
            text_file,
            model_dir,
            output,
        } => {
            let mut builder = PipelineConfigBuilder::from_config(base);
            if let Some(dir) = model_dir {
                builder = builder.model_dir(dir);
            }
            if let Some(path) = output {
                builder = builder.results_csv(path);
            }
            let config = builder.build().context("invalid configuration")?;
            cli::classify_command(&config, filenames, text_file, format, cli.verbose).await
        }
        Commands::Train { dir, seed, model_dir } => {
            let mut builder = PipelineConfigBuilder::from_config(base);
            if seed.is_some() {
                builder = builder.split_seed(seed);
            }
            if let Some(model_dir) = model_dir {
                builder = builder.model_dir(model_dir);
            }
            let config = builder.build().context("invalid configuration")?;
            cli::train_command(&config, dir, format, cli.verbose).await
        }
    }
}
