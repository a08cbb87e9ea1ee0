//! Command-line interface for the `setupflow` binary

use crate::types::WizardMode;
use crate::view::Answers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// setupflow - run an installation workflow described in a JSON file
#[derive(Parser)]
#[command(name = "setupflow")]
#[command(about = "Drive an installation wizard and install from a JSON description")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: walk every step without touching the system.
    ///
    /// Component hooks, elevation and platform side effects (PATH,
    /// shortcuts, registration) are skipped and logged. Pre-checks and
    /// progress reporting still run.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the installation non-interactively
    Install {
        /// Path to the installation description
        #[arg(short, long)]
        config: PathBuf,

        /// Wizard mode (express, custom, advanced); defaults to the file's
        #[arg(short, long)]
        mode: Option<WizardMode>,

        /// Registered wizard to use instead of the mode's built-in one
        #[arg(long)]
        wizard: Option<String>,

        /// Branch to take in the advanced wizard (express or custom)
        #[arg(long)]
        branch: Option<WizardMode>,

        /// Install location
        #[arg(long)]
        install_dir: Option<PathBuf>,

        /// Components to install, comma separated; required ones are always kept
        #[arg(long, value_delimiter = ',')]
        components: Option<Vec<String>>,

        /// Theme for the theme step
        #[arg(long)]
        theme: Option<String>,

        /// Accept the license agreement
        #[arg(long)]
        accept_license: bool,

        /// Answer yes to everything: license, summary, elevation
        #[arg(short, long)]
        yes: bool,

        /// How many times a failing component is retried
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Skip the wizard and install the file's selection directly
        #[arg(long)]
        no_wizard: bool,
    },
    /// Validate an installation description
    Validate {
        /// Path to the installation description
        config: PathBuf,
    },
    /// Print the wizard states and the path taken with default answers
    Plan {
        /// Path to the installation description
        #[arg(short, long)]
        config: PathBuf,

        /// Wizard mode; defaults to the file's
        #[arg(short, long)]
        mode: Option<WizardMode>,
    },
}

impl Commands {
    /// Prompt answers for an `install` invocation.
    pub fn answers(&self) -> Option<Answers> {
        match self {
            Commands::Install {
                branch,
                install_dir,
                components,
                theme,
                accept_license,
                yes,
                retries,
                ..
            } => Some(Answers {
                accept_license: *accept_license || *yes,
                components: components.clone(),
                install_path: install_dir.clone(),
                proceed: true,
                allow_elevation: *yes,
                mode: *branch,
                theme: theme.clone(),
                retries: *retries,
            }),
            _ => None,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
