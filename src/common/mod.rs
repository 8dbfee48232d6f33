//! Common utilities shared by every stage of the harness

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

use regex::Regex;
use std::sync::OnceLock;

/// Remove ANSI escape sequences, as kernels emit colored tracebacks
pub fn strip_ansi(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("static pattern"));
    re.replace_all(text, "").into_owned()
}

/// Compute the indentation immediately preceding byte offset `start`
///
/// Walks backward over contiguous spaces and tabs, counting each
/// separately, and stops at any other character or the start of the
/// text. The indent is rendered as the spaces followed by the tabs.
pub fn leading_indent(text: &str, start: usize) -> String {
    let mut spaces = 0;
    let mut tabs = 0;
    for c in text[..start].chars().rev() {
        match c {
            ' ' => spaces += 1,
            '\t' => tabs += 1,
            _ => break,
        }
    }
    format!("{}{}", " ".repeat(spaces), "\t".repeat(tabs))
}
