//! Tutorial test runs
//!
//! Loads the YAML run configuration, runs each tutorial on every hardware
//! unit assigned to it, and records what happened per test.

mod config;
mod runner;
mod transcript;

pub use config::*;
pub use runner::{
    copy_images, print_summary, remove_work_dir, run_hw_config, run_tests, write_worker_log,
    RunContext, RunSummary, Tally, WorkerReport,
};
pub use transcript::Transcript;
