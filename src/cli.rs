use clap::{Parser, Subcommand};
use reelfetch_common::Priority;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelfetch")]
#[command(author, version, about = "Resilient artwork and metadata fetcher")]
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
    /// Fetch a resource through the engine
    Fetch {
        /// Path relative to the endpoint (e.g. w500/abc.jpg)
        #[arg(required = true)]
        path: String,

        /// Cache key (defaults to the path)
        #[arg(long)]
        key: Option<String>,

        /// Task priority: low, normal, high or critical
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Write the body to this file instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Probe every configured endpoint and report its health
    CheckEndpoints {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
