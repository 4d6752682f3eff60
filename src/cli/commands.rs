use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `migration-advisor` - risk-gated advisor directives for migration runs.
#[derive(Parser, Debug)]
#[command(name = "migration-advisor")]
#[command(version)]
#[command(
    about = "Apply advisor directives and orchestrate migration runs with operator veto.",
    long_about = None
)]
pub struct Cli {
    /// Config file to use instead of ~/.migration-advisor/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a directive batch JSON file
    Process {
        /// Path to the directive batch
        file: PathBuf,

        /// Treat the batch as already confirmed by the operator
        #[arg(long)]
        confirmed: bool,

        /// Do not write resulting settings back to config.toml
        #[arg(long)]
        no_save: bool,
    },

    /// Queue a run plan JSON file, approve it and wait for the outcome
    RunPlan {
        /// Path to the run plan
        file: PathBuf,

        /// Write a JSON snapshot of the plan table after the run
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Show current settings
    Settings,

    /// Interactive console: operator commands and directive batches, one per line
    Console,
}
