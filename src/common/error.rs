//! Error types for the notebook harness
//!
//! Errors here are fatal for a run. Failures raised inside an executed
//! notebook cell are not errors: they are captured as data
//! (see [`crate::driver::CellError`]) and classified against an allow-list.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid replacement pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // === Notebook Errors ===
    #[error("Failed to parse notebook '{path}': {reason}")]
    NotebookParse { path: String, reason: String },

    #[error("Referenced notebook '{path}' could not be read: {reason}")]
    Reference { path: String, reason: String },

    #[error("Inlining exceeded {limit} expansions in cell {cell}; referenced notebooks may be cyclic")]
    InlineDepth { cell: usize, limit: usize },

    // === Engine Errors ===
    #[error("Execution engine '{0}' not found. Install jupyter or pass --engine")]
    EngineNotFound(String),

    #[error("Execution engine failed on '{path}': {message}")]
    EngineFailed { path: String, message: String },

    // === Orchestration Errors ===
    #[error("Worker for hardware unit {unit} failed: {message}")]
    Worker { unit: usize, message: String },

    #[error("{failed} of {run} notebook runs failed")]
    TestsFailed { failed: usize, run: usize },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a file read error for `path`
    pub fn file_read(path: &Path, error: impl ToString) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create a file write error for `path`
    pub fn file_write(path: &Path, error: impl ToString) -> Self {
        Self::FileWrite {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an unresolvable reference error
    pub fn reference(path: &Path, reason: impl ToString) -> Self {
        Self::Reference {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an engine failure error
    pub fn engine_failed(path: &Path, message: impl ToString) -> Self {
        Self::EngineFailed {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from configuration rather than execution
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::ConfigParse(_) | Error::InvalidPattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Error::invalid_pattern("cw.scope(", "unclosed group");
        assert!(err.is_config());
        assert!(err.to_string().contains("cw.scope("));
    }

    #[test]
    fn test_reference_error_names_path() {
        let err = Error::reference(Path::new("../Helper.ipynb"), "not found");
        assert!(!err.is_config());
        assert!(err.to_string().contains("../Helper.ipynb"));
    }

    #[test]
    fn test_write_error_says_write() {
        let err = Error::file_write(Path::new("out/lab.rst"), "permission denied");
        assert_eq!(
            err.to_string(),
            "Failed to write file 'out/lab.rst': permission denied"
        );
    }
}
