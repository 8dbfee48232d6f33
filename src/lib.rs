//! nbharness - tutorial notebook test harness
//!
//! Prepares notebooks for a hardware configuration (parameter injection,
//! reference inlining, shell guarding, regex substitution), hands them to
//! an external execution engine, and judges and reports the results.

pub mod cli;
pub mod commands;
pub mod common;
pub mod driver;
pub mod engine;
pub mod notebook;
pub mod preprocess;
pub mod report;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use driver::{Driver, Verdict};
pub use notebook::Notebook;
