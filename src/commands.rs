//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::preprocess::clear::{DEFAULT_EXCLUDE, DEFAULT_INCLUDE};

#[derive(Subcommand)]
pub enum Commands {
    /// Run every tutorial configuration against the connected hardware
    Run {
        /// Path to the YAML run configuration
        config: PathBuf,

        /// Directory tutorial paths are relative to
        #[arg(long)]
        notebook_dir: Option<PathBuf>,

        /// Directory reports are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Directory for per-unit logs and harness.log
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Notebook execution program (default: jupyter)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Print every traceback of a failing notebook, not just the first
        #[arg(long)]
        all_tracebacks: bool,

        /// Keep the scratch directory notebooks create
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Test a single notebook
    Test {
        /// Path to the notebook
        notebook: PathBuf,

        /// Directory reports are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Notebook execution program (default: jupyter)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Parameter or run option, parsed as YAML: -p PLATFORM=CWNANO -p baud=38400
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Clear outputs and reset parameters of notebooks in a directory
    Clear {
        /// Directory holding the notebooks
        dir: PathBuf,

        /// Only clear file names matching this pattern
        #[arg(long, default_value = DEFAULT_INCLUDE)]
        include: String,

        /// Skip file names matching this pattern
        #[arg(long, default_value = DEFAULT_EXCLUDE)]
        exclude: String,

        /// Clear outputs only, leaving the parameter cell as it is
        #[arg(long)]
        keep_parameters: bool,
    },
}
