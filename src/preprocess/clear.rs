//! Clearing notebook outputs
//!
//! Resets tutorials to a clean, default-parameter state before they are
//! committed.

use regex::Regex;
use std::path::{Path, PathBuf};

use super::params::{extract_parameters, parameter_values, replace_definitions, ParameterSet};
use crate::common::{Error, Result};
use crate::notebook::Notebook;

/// Default include pattern for `clear`
pub const DEFAULT_INCLUDE: &str = r".*\.ipynb$";
/// Default exclude pattern for `clear`
pub const DEFAULT_EXCLUDE: &str = r"^Lab.*";

/// Parameter values a cleared notebook is reset to
pub fn default_clear_parameters() -> ParameterSet {
    [
        ("SCOPETYPE", "OPENADC"),
        ("PLATFORM", "CWLITEARM"),
        ("VERSION", "HARDWARE"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), serde_yaml::Value::String(v.to_string())))
    .collect()
}

/// Drop outputs and execution counts, resetting declared parameters
///
/// With no defaults the parameter cell is left untouched.
pub fn clear_notebook(notebook: &mut Notebook, defaults: &ParameterSet) {
    if !defaults.is_empty() {
        let declared = extract_parameters(notebook);
        let params = parameter_values(&declared, defaults);
        replace_definitions(notebook, &params);
    }
    for cell in notebook.code_cells_mut() {
        cell.outputs.clear();
        cell.execution_count = None;
    }
}

/// Clear a notebook file in place
pub fn clear_file(path: &Path, defaults: &ParameterSet) -> Result<()> {
    let mut notebook = Notebook::load(path)?;
    clear_notebook(&mut notebook, defaults);
    notebook.save(path)
}

/// Clear every matching notebook file in `dir`; returns the files cleared
pub fn clear_outputs_in_dir(
    dir: &Path,
    include: &str,
    exclude: &str,
    defaults: &ParameterSet,
) -> Result<Vec<PathBuf>> {
    let include = Regex::new(include).map_err(|e| Error::invalid_pattern(include, e))?;
    let exclude = Regex::new(exclude).map_err(|e| Error::invalid_pattern(exclude, e))?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| include.is_match(name) && !exclude.is_match(name))
        })
        .collect();
    files.sort();

    for file in &files {
        println!("Clearing {}", file.display());
        clear_file(file, defaults)?;
    }
    Ok(files)
}
