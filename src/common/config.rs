//! Harness settings file handling
//!
//! These are machine-level settings (which engine to run, where notebooks
//! and reports live). The per-run hardware/tutorial matrix is YAML and is
//! handled by [`crate::testing::config`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main settings structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Settings {
    /// Execution engine settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Directory layout
    #[serde(default)]
    pub paths: PathSettings,

    /// Shell-command guard settings
    #[serde(default)]
    pub shell: ShellSettings,
}

/// How to invoke the notebook execution engine
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    /// Program to run (looked up in PATH if not absolute)
    #[serde(default = "default_engine_program")]
    pub program: PathBuf,

    /// Arguments placed before the `nbconvert` subcommand
    #[serde(default)]
    pub args: Vec<String>,

    /// Kernel used to execute notebooks
    #[serde(default = "default_kernel")]
    pub kernel: String,

    /// How referenced notebooks are converted to script text when inlined
    #[serde(default)]
    pub script_export: ScriptExport,
}

/// Script conversion used by the reference inliner
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptExport {
    /// Built-in magic translation
    #[default]
    Native,
    /// `<program> nbconvert --to python`
    Nbconvert,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            args: Vec::new(),
            kernel: default_kernel(),
            script_export: ScriptExport::default(),
        }
    }
}

fn default_engine_program() -> PathBuf {
    PathBuf::from("jupyter")
}

fn default_kernel() -> String {
    "python3".to_string()
}

/// Directory layout for a run
#[derive(Debug, Deserialize, Clone)]
pub struct PathSettings {
    /// Directory tutorial paths in the run configuration are relative to
    #[serde(default = "default_notebook_dir")]
    pub notebook_dir: PathBuf,

    /// Directory rendered reports and images are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory per-worker logs are written to
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Scratch directory notebooks generate artifacts into; removed after a run
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            notebook_dir: default_notebook_dir(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            work_dir: default_work_dir(),
        }
    }
}

fn default_notebook_dir() -> PathBuf {
    PathBuf::from("..")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("../../tutorials")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("projects")
}

/// Shell-command guard settings
#[derive(Debug, Deserialize, Clone)]
pub struct ShellSettings {
    /// File guarded shell commands redirect their output into.
    ///
    /// Shared by every worker; concurrent guarded commands on different
    /// hardware units can clobber each other's capture.
    #[serde(default = "default_capture_path")]
    pub capture_path: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            capture_path: default_capture_path(),
        }
    }
}

fn default_capture_path() -> String {
    crate::preprocess::shell_guard::DEFAULT_CAPTURE_PATH.to_string()
}

impl Settings {
    /// Load settings from the default settings file
    ///
    /// Returns default settings if the file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from an explicit TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Resolve the engine program, searching PATH for bare names
    pub fn resolve_engine(&self) -> Result<PathBuf> {
        let program = &self.engine.program;
        if program.components().count() > 1 {
            return if program.exists() {
                Ok(program.clone())
            } else {
                Err(Error::EngineNotFound(program.display().to_string()))
            };
        }
        which::which(program).map_err(|_| Error::EngineNotFound(program.display().to_string()))
    }
}
