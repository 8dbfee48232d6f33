//! Shell-command guarding
//!
//! An expanded `%%bash` cell magic swallows the command's output when it
//! fails. Guarded commands redirect their output into a capture file and
//! the call is wrapped so a failure re-raises as `OSError` carrying that
//! output, which then shows up as a cell error.
//!
//! Rewrites are substring replacements over the whole cell: a command
//! text that appears more than once in a cell is rewritten everywhere.

use regex::Regex;
use std::sync::OnceLock;

use crate::common::leading_indent;
use crate::notebook::Notebook;

/// Capture file used when none is configured
pub const DEFAULT_CAPTURE_PATH: &str = "/tmp/tmp.txt";

fn bash_magic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)(get_ipython\(\)\.run_cell_magic\('bash', '.*?', '(.*?)'\))")
            .expect("static pattern")
    })
}

struct GuardSite {
    directive: String,
    command: String,
    indent: String,
}

/// Wraps expanded bash cell magics in failure capture
#[derive(Debug, Clone)]
pub struct ShellGuard {
    capture_path: String,
}

impl ShellGuard {
    pub fn new(capture_path: impl Into<String>) -> Self {
        Self {
            capture_path: capture_path.into(),
        }
    }

    pub fn capture_path(&self) -> &str {
        &self.capture_path
    }

    /// Guard every code cell; returns the number of directives rewritten
    pub fn guard_notebook(&self, notebook: &mut Notebook) -> usize {
        let mut total = 0;
        for cell in notebook.code_cells_mut() {
            let (source, count) = self.guard_source(cell.source.as_str());
            if count > 0 {
                cell.source.set(source);
                total += count;
            }
        }
        total
    }

    /// Guard one cell's source
    pub fn guard_source(&self, source: &str) -> (String, usize) {
        let sites: Vec<GuardSite> = bash_magic()
            .captures_iter(source)
            .map(|caps| {
                let full = caps.get(1).expect("group 1 always participates");
                GuardSite {
                    directive: full.as_str().to_string(),
                    command: caps[2].to_string(),
                    indent: leading_indent(source, full.start()),
                }
            })
            .collect();

        let mut text = source.to_string();
        for site in &sites {
            let ind = &site.indent;
            let guarded = format!(
                "try:\n{ind}    {directive}\n{ind}except:\n{ind}    x=open(\"{capture}\").read(); print(x); raise OSError(x)\n",
                ind = ind,
                directive = site.directive,
                capture = self.capture_path,
            );
            text = text.replace(&site.directive, &guarded);

            if !site.command.is_empty() {
                let redirected = format!("{} &> {}", site.command, self.capture_path);
                text = text.replace(&site.command, &redirected);
            }
        }
        (text, sites.len())
    }
}

impl Default for ShellGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_matching_is_noop() {
        let guard = ShellGuard::default();
        let source = "get_ipython().run_line_magic('run', 'x.ipynb')\nprint(1)";
        assert_eq!(guard.guard_source(source), (source.to_string(), 0));
    }

    #[test]
    fn test_wraps_and_redirects() {
        let guard = ShellGuard::default();
        let source = "get_ipython().run_cell_magic('bash', '', 'make PLATFORM=CW308')\n";
        let (out, count) = guard.guard_source(source);
        assert_eq!(count, 1);
        assert_eq!(
            out,
            "try:\n    get_ipython().run_cell_magic('bash', '', 'make PLATFORM=CW308 &> /tmp/tmp.txt')\n\
             except:\n    x=open(\"/tmp/tmp.txt\").read(); print(x); raise OSError(x)\n\n"
        );
    }

    #[test]
    fn test_keeps_indentation() {
        let guard = ShellGuard::new("/tmp/cap.txt");
        let source = "if True:\n    get_ipython().run_cell_magic('bash', '-s x', 'ls')";
        let (out, _) = guard.guard_source(source);
        assert!(out.contains("if True:\n    try:\n        get_ipython()"));
        assert!(out.contains("\n    except:\n        x=open(\"/tmp/cap.txt\")"));
        assert!(out.contains("'ls &> /tmp/cap.txt'"));
    }

    #[test]
    fn test_command_may_span_lines() {
        let guard = ShellGuard::default();
        let source = "get_ipython().run_cell_magic('bash', '', 'cd fw\nmake')";
        let (out, count) = guard.guard_source(source);
        assert_eq!(count, 1);
        assert!(out.contains("'cd fw\nmake &> /tmp/tmp.txt'"));
    }

    #[test]
    fn test_empty_command_not_redirected() {
        let guard = ShellGuard::default();
        let (out, count) = guard.guard_source("get_ipython().run_cell_magic('bash', '', '')");
        assert_eq!(count, 1);
        assert!(!out.contains("&>"));
        assert!(out.starts_with("try:\n"));
    }
}
