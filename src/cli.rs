use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// setup - run a declarative installation
#[derive(Parser, Debug)]
#[command(name = "setup")]
#[command(about = "Install an application from a declarative setup document")]
#[command(version)]
pub struct Cli {
    /// Setup document (defaults to setup.json or config/setup.json in the
    /// current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dry-run mode: every command is recorded as skipped and nothing on
    /// the machine changes.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Verbose logging (debug level unless RUST_LOG says otherwise)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Registry hive file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the installation
    Install {
        /// Installation directory (defaults to the document's default path)
        #[arg(short, long)]
        install_path: Option<PathBuf>,

        /// Components to install, comma-separated (required components are
        /// always added; defaults to the document's default selection)
        #[arg(short, long, value_delimiter = ',')]
        select: Option<Vec<String>>,

        /// Accept the license agreement
        #[arg(long)]
        accept_license: bool,

        /// Write a JSON report of the run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check that the setup document loads and is consistent
    Validate,
    /// Print the commands an install would run, in order
    Plan {
        /// Components to plan for, comma-separated
        #[arg(short, long, value_delimiter = ',')]
        select: Option<Vec<String>>,
    },
    /// List the components available on this machine
    Components,
    /// List the wizard pages that would be shown
    Pages,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
