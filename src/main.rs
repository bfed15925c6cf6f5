//! Binary entry point for trendvault.
//!
//! Runs pipeline cycles and inspects the live store from the command line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use trendvault::config::TrendvaultConfig;
use trendvault::observability::{self, InitOptions};

use commands::{
    cmd_archive, cmd_config, cmd_maintain, cmd_models, cmd_query, cmd_rankings, cmd_run,
};

/// Trendvault - provider-cascade content pipeline with a bounded ranked store.
#[derive(Parser)]
#[command(name = "trendvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TRENDVAULT_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline cycle.
    Run {
        /// Restrict the cycle to these categories (repeatable).
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Cycle index for credential rotation (default: UTC hours since epoch).
        #[arg(long)]
        cycle: Option<u64>,
    },

    /// Show ranked model candidates per provider.
    Models {
        /// Only show this provider.
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// List live items in a category.
    Query {
        /// Category name.
        category: String,

        /// Maximum number of items.
        #[arg(short, long, default_value = "30")]
        limit: usize,
    },

    /// Run the eviction pass for a category.
    Maintain {
        /// Category name.
        category: String,
    },

    /// Show the latest trending ranking of a category.
    Rankings {
        /// Category name.
        category: String,
    },

    /// Sweep items above the archive threshold into the archive.
    Archive,

    /// Print the resolved configuration.
    Config,
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init(
        &config,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(
    command: Commands,
    config: TrendvaultConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run { categories, cycle } => cmd_run(&config, categories, cycle),
        Commands::Models { provider } => cmd_models(&config, provider),
        Commands::Query { category, limit } => cmd_query(&config, &category, limit),
        Commands::Maintain { category } => cmd_maintain(&config, &category),
        Commands::Rankings { category } => cmd_rankings(&config, &category),
        Commands::Archive => cmd_archive(&config),
        Commands::Config => cmd_config(&config),
    }
}

/// Loads configuration from `path`, or the default location.
fn load_config(path: Option<&str>) -> Result<TrendvaultConfig, Box<dyn std::error::Error>> {
    match path.filter(|p| !p.trim().is_empty()) {
        Some(config_path) => {
            TrendvaultConfig::load_from_file(Path::new(config_path)).map_err(Into::into)
        },
        None => Ok(TrendvaultConfig::load_default()),
    }
}
