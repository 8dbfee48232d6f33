//! Configuration paths
//!
//! Settings live in the platform config directory:
//! - Linux: `~/.config/nbharness/`
//! - macOS: `~/Library/Application Support/nbharness/`
//! - Windows: `%APPDATA%\nbharness\`

use std::path::PathBuf;

const APP_NAME: &str = "nbharness";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
