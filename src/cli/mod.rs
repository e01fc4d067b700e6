use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nexuslims_extract::config::ExtractConfig;
use nexuslims_extract::schema::DatasetType;

mod classify;
mod decoders;
mod extract;
mod report;

/// nexuslims-extract - Microscopy metadata extraction
#[derive(Parser)]
#[command(name = "nexuslims-extract")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load instruments and the data root from a TOML config file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract metadata from files and print it as JSON
    Extract {
        /// Input files
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Validate against the canonical schema instead of printing raw records
        #[arg(long)]
        canonical: bool,

        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List registered decoders per extension
    Decoders,

    /// Classify a field name against a dataset type's schema
    Classify {
        /// Field name, e.g. acceleration_voltage
        #[arg(value_name = "FIELD")]
        field: String,

        /// Dataset type (Image, Spectrum, SpectrumImage, Diffraction, Misc, Unknown)
        #[arg(short = 't', long, default_value = "Image")]
        dataset_type: DatasetType,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

fn load_config(path: Option<&Path>) -> Result<ExtractConfig> {
    match path {
        Some(path) => ExtractConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ExtractConfig::from_env()),
    }
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract {
            files,
            canonical,
            pretty,
        } => extract::run(&load_config(cli.config.as_deref())?, files, canonical, pretty),
        Commands::Decoders => decoders::run(&load_config(cli.config.as_deref())?),
        Commands::Classify {
            field,
            dataset_type,
        } => classify::run(&field, dataset_type),
    }
}
