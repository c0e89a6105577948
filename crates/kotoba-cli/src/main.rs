//! Kotoba CLI - batch Japanese morphological analysis.
//!
//! Runs the kagome tokenizer module on the host bridge and prints the
//! analysis as JSON.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;

use commands::{analyze, config};

/// Kotoba - Japanese text analysis over a wasm tokenizer
#[derive(Parser)]
#[command(name = "kotoba")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Additional configuration file, applied over ~/.kotoba/config.toml
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize texts and print the JSON batch response
    Analyze {
        /// Texts to analyze
        texts: Vec<String>,

        /// Tokenizer module path or URL (overrides module.source)
        #[arg(short, long, value_name = "SRC")]
        module: Option<String>,

        /// Read a JSON batch request from stdin instead
        #[arg(long, conflicts_with = "texts")]
        stdin: bool,

        /// Print the clickable words of each text, one text per line,
        /// instead of JSON
        #[arg(short, long)]
        words: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = kotoba_config::Config::load(cli.config.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = if let Ok(resolved) = &resolved {
        let mut lc = config_bridge::to_log_config(&resolved.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        // Fallback so the config error itself can still be reported.
        let level = if cli.verbose { "debug" } else { "info" };
        kotoba_telemetry::LogConfig::new(level)
    };
    if let Err(e) = kotoba_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let resolved = resolved.context("failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            texts,
            module,
            stdin,
            words,
        } => {
            let output = if words {
                analyze::Output::Words
            } else {
                analyze::Output::Json
            };
            analyze::run_analyze(&resolved.config, texts, module.as_deref(), stdin, output).await?;
        },
        Commands::Config {
            command: ConfigCommands::Show,
        } => config::show_config(&resolved)?,
    }

    Ok(())
}
