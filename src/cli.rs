use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelscan")]
#[command(author, version, about = "Media library scanner and metadata merge pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the configured libraries and enrich every discovered movie
    Scan {
        /// Scan only this library root, ignoring the configured list
        #[arg(long)]
        library: Option<PathBuf>,

        /// Discover and report without enrichment or state updates
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a single file or directory name and show the draft metadata
    ParseName {
        /// Name to parse, e.g. "Inception (2010) 1080p.mkv"
        #[arg(required = true)]
        name: String,

        /// Treat the name as a directory rather than a file
        #[arg(long)]
        directory: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that optional external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
