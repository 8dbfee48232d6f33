//! Output escaping for reStructuredText reports
//!
//! Stream output is embedded in `parsed-literal` blocks, where backticks
//! and underscores start inline markup.

use crate::notebook::{Notebook, Output};

/// Escape backticks and underscores not already escaped
///
/// A character counts as escaped when an odd number of backslashes
/// immediately precede it, so escaping already-escaped text is a no-op.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut backslashes = 0usize;
    for c in text.chars() {
        if (c == '`' || c == '_') && backslashes % 2 == 0 {
            out.push('\\');
        }
        out.push(c);
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
    }
    out
}

/// Escape every stream output in the notebook; returns outputs changed
pub fn sanitize_outputs(notebook: &mut Notebook) -> usize {
    let mut changed = 0;
    for cell in notebook.code_cells_mut() {
        for output in &mut cell.outputs {
            if let Output::Stream(stream) = output {
                let escaped = escape_markup(stream.text.as_str());
                if escaped != stream.text.as_str() {
                    stream.text.set(escaped);
                    changed += 1;
                }
            }
        }
    }
    changed
}
