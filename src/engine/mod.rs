//! Notebook execution engines
//!
//! Execution is delegated to an external kernel runner. The engine owns
//! timeouts and kernel lifecycle; the harness only hands over a prepared
//! notebook and reads back the executed one.

mod nbconvert;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::notebook::Notebook;

pub use nbconvert::NbconvertEngine;

/// Parameters for one execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Directory the kernel runs in; relative paths in the notebook resolve here
    pub working_dir: PathBuf,
    /// Keep executing after a cell raises, recording the error as an output
    pub allow_errors: bool,
}

impl ExecutionRequest {
    pub fn new(working_dir: &Path, allow_errors: bool) -> Self {
        let working_dir = if working_dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            working_dir.to_path_buf()
        };
        Self {
            working_dir,
            allow_errors,
        }
    }
}

/// Executes every cell of a notebook and returns it with outputs filled in
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, notebook: &Notebook, request: &ExecutionRequest) -> Result<Notebook>;
}
