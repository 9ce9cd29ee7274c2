//! segcheck CLI
//!
//! Command-line tools for checking segment codecs.
//!
//! # Commands
//!
//! - `livedocs` - Run the live-docs round-trip conformance harness
//! - `inspect` - Print the decoded header of a live-docs file
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// segcheck command-line codec tools.
#[derive(Parser)]
#[command(name = "segcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run live-docs round-trip conformance trials
    Livedocs {
        /// Number of random trials
        #[arg(short, long, default_value_t = 50)]
        trials: usize,

        /// Seed for every random choice (drawn and printed when omitted)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Smallest document count of a random trial
        #[arg(long, default_value_t = 3)]
        min_docs: u32,

        /// Largest document count of a random trial
        #[arg(long, default_value_t = 1000)]
        max_docs: u32,

        /// Codec under test (adaptive, dense)
        #[arg(short, long, default_value = "adaptive")]
        format: String,

        /// Write trial files here instead of in memory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Also run the overflow probe at the document limit
        #[arg(long)]
        expensive: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the decoded header of a live-docs file
    Inspect {
        /// Path to a `.liv` file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Livedocs {
            trials,
            seed,
            min_docs,
            max_docs,
            format,
            dir,
            expensive,
            json,
        } => {
            let options = commands::livedocs::Options {
                trials,
                seed,
                min_docs,
                max_docs,
                codec: format,
                dir,
                expensive,
                json,
            };
            commands::livedocs::run(&options)?;
        }
        Commands::Inspect { file, format } => {
            commands::inspect::run(&file, &format)?;
        }
        Commands::Version => {
            println!("segcheck CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("segcheck core v{}", segcheck_core::VERSION);
        }
    }

    Ok(())
}
