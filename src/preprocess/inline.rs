//! Reference inlining
//!
//! Replaces `%run other.ipynb` directives (and their expanded
//! `get_ipython().run_line_magic('run', ...)` form) with the referenced
//! notebook's code, so later substitutions also reach code that lives in
//! helper notebooks.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::common::{leading_indent, Error, Result};
use crate::notebook::{Notebook, ScriptExporter};

/// Upper bound on expansions in one cell; only reachable through cyclic references
pub const MAX_EXPANSIONS: usize = 64;

fn magic_form() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(%run\s*["']?(.*\.ipynb)["']?)"#).expect("static pattern"))
}

fn expanded_form() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(get_ipython\(\)\.run_line_magic\('run', '"?(.*?\.ipynb)"?'\))"#)
            .expect("static pattern")
    })
}

/// A located run directive
struct RunDirective {
    text: String,
    target: String,
    start: usize,
}

fn find_directive(source: &str) -> Option<RunDirective> {
    [magic_form(), expanded_form()].iter().find_map(|re| {
        re.captures(source).map(|caps| {
            let full = caps.get(1).expect("group 1 always participates");
            RunDirective {
                text: full.as_str().to_string(),
                target: caps[2].to_string(),
                start: full.start(),
            }
        })
    })
}

/// Prefix `indent` to the first line and after every newline
pub fn indent_block(code: &str, indent: &str) -> String {
    if indent.is_empty() {
        return code.to_string();
    }
    format!("{}{}", indent, code.replace('\n', &format!("\n{}", indent)))
}

/// Inlines external notebook references in code cells
pub struct ReferenceInliner<'a> {
    notebook_dir: PathBuf,
    exporter: &'a dyn ScriptExporter,
}

impl<'a> ReferenceInliner<'a> {
    /// `notebook_dir` is the directory referenced paths are resolved against
    pub fn new(notebook_dir: impl Into<PathBuf>, exporter: &'a dyn ScriptExporter) -> Self {
        Self {
            notebook_dir: notebook_dir.into(),
            exporter,
        }
    }

    /// Inline every directive in every code cell; returns the number of expansions
    pub fn inline_notebook(&self, notebook: &mut Notebook) -> Result<usize> {
        let mut total = 0;
        for (index, cell) in notebook.code_cells_mut().enumerate() {
            let (source, count) = self.inline_source(cell.source.as_str(), index)?;
            if count > 0 {
                cell.source.set(source);
                total += count;
            }
        }
        Ok(total)
    }

    /// Inline directives in one cell's source until none remain
    pub fn inline_source(&self, source: &str, cell: usize) -> Result<(String, usize)> {
        let mut text = source.to_string();
        let mut expansions = 0;

        while let Some(directive) = find_directive(&text) {
            expansions += 1;
            if expansions > MAX_EXPANSIONS {
                return Err(Error::InlineDepth {
                    cell,
                    limit: MAX_EXPANSIONS,
                });
            }

            let indent = leading_indent(&text, directive.start);
            let code = self.load_code(&directive.target)?;
            let replacement = format!("\n{}\n", indent_block(&code, &indent));
            text = text.replace(&directive.text, &replacement);
        }

        Ok((text, expansions))
    }

    fn load_code(&self, target: &str) -> Result<String> {
        let path = self.resolve(target);
        tracing::debug!("Inlining {}", path.display());
        let notebook = Notebook::load(&path).map_err(|e| Error::reference(&path, e))?;
        self.exporter
            .to_script(&notebook)
            .map_err(|e| Error::reference(&path, e))
    }

    fn resolve(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.notebook_dir.join(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{Cell, PythonScriptExporter};
    use tempfile::TempDir;

    fn write_notebook(dir: &Path, name: &str, cells: Vec<Cell>) {
        Notebook::new(cells).save(&dir.join(name)).unwrap();
    }

    fn helper_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_notebook(
            dir.path(),
            "other.ipynb",
            vec![Cell::code("scope = cw.scope()\ntarget = cw.target(scope)")],
        );
        dir
    }

    #[test]
    fn test_no_directive_is_noop() {
        let dir = helper_dir();
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let source = "x = 1\nprint('run me')";
        let (out, count) = inliner.inline_source(source, 0).unwrap();
        assert_eq!(out, source);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_indented_run_reindents_every_line() {
        let dir = helper_dir();
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let (out, count) = inliner.inline_source("    %run other.ipynb", 0).unwrap();
        assert_eq!(count, 1);

        let nb = Notebook::load(&dir.path().join("other.ipynb")).unwrap();
        let script = PythonScriptExporter.to_script(&nb).unwrap();
        assert_eq!(out, format!("    \n{}\n", indent_block(&script, "    ")));
        assert!(out.contains("    scope = cw.scope()\n"));

        let mut lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines.pop(), Some(""));
        assert!(lines.iter().all(|line| line.starts_with("    ")));

        let (again, count) = inliner.inline_source(&out, 0).unwrap();
        assert_eq!(again, out);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_nested_references_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write_notebook(dir.path(), "leaf.ipynb", vec![Cell::code("LEAF = 1")]);
        write_notebook(
            dir.path(),
            "middle.ipynb",
            vec![Cell::code("%run \"leaf.ipynb\"\nMIDDLE = 2")],
        );
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let (out, count) = inliner.inline_source("%run middle.ipynb", 0).unwrap();
        assert_eq!(count, 2);
        assert!(out.contains("LEAF = 1"));
        assert!(out.contains("MIDDLE = 2"));
        assert!(!out.contains("run_line_magic('run'"));
    }

    #[test]
    fn test_tab_indentation() {
        let dir = helper_dir();
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let (out, _) = inliner
            .inline_source("if True:\n\t%run 'other.ipynb'", 0)
            .unwrap();
        assert!(out.contains("\n\tscope = cw.scope()\n"));
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let err = inliner.inline_source("%run missing.ipynb", 0).unwrap_err();
        assert!(matches!(err, Error::Reference { .. }));
    }

    #[test]
    fn test_cyclic_reference_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        write_notebook(dir.path(), "loop.ipynb", vec![Cell::code("%run loop.ipynb")]);
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let err = inliner.inline_source("%run loop.ipynb", 3).unwrap_err();
        assert!(matches!(err, Error::InlineDepth { cell: 3, .. }));
    }

    #[test]
    fn test_inline_notebook_skips_markdown() {
        let dir = helper_dir();
        let inliner = ReferenceInliner::new(dir.path(), &PythonScriptExporter);
        let mut nb = Notebook::new(vec![
            Cell::markdown("Run `%run other.ipynb` first"),
            Cell::code("%run other.ipynb"),
        ]);
        assert_eq!(inliner.inline_notebook(&mut nb).unwrap(), 1);
        assert_eq!(nb.cells[0].source(), "Run `%run other.ipynb` first");
        assert!(nb.cells[1].source().contains("cw.scope()"));
    }
}
