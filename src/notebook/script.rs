//! Notebook to script conversion
//!
//! The reference inliner needs a referenced notebook as plain code. Magics
//! are expanded to their `get_ipython()` call forms, matching what the
//! kernel's input transformer produces, so nested directives stay
//! recognizable after inlining.

use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tokio::runtime::RuntimeFlavor;

use super::literal::repr_str;
use super::model::{Cell, Notebook};
use crate::common::{Error, Result};

/// Converts a notebook into equivalent plain code
pub trait ScriptExporter: Send + Sync {
    fn to_script(&self, notebook: &Notebook) -> Result<String>;
}

/// In-process exporter producing Python script text
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonScriptExporter;

impl ScriptExporter for PythonScriptExporter {
    fn to_script(&self, notebook: &Notebook) -> Result<String> {
        let mut out = String::from("#!/usr/bin/env python\n# coding: utf-8\n");
        for cell in &notebook.cells {
            match cell {
                Cell::Code(code) => {
                    let count = code
                        .execution_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| " ".to_string());
                    out.push_str(&format!("\n# In[{}]:\n\n\n", count));
                    out.push_str(&transform_magics(code.source.as_str()));
                    out.push_str("\n\n");
                }
                Cell::Markdown(text) => {
                    out.push('\n');
                    for line in text.source.as_str().lines() {
                        if line.is_empty() {
                            out.push_str("#\n");
                        } else {
                            out.push_str(&format!("# {}\n", line));
                        }
                    }
                    out.push('\n');
                }
                Cell::Raw(_) => {}
            }
        }
        Ok(out.trim_end().to_string() + "\n")
    }
}

/// Expand cell magics, line magics and shell escapes into Python calls
pub fn transform_magics(source: &str) -> String {
    if let Some(rest) = source.strip_prefix("%%") {
        let (header, body) = rest.split_once('\n').unwrap_or((rest, ""));
        let (name, args) = header.split_once(' ').unwrap_or((header, ""));
        return format!(
            "get_ipython().run_cell_magic({}, {}, {})\n",
            repr_str(name),
            repr_str(args.trim()),
            repr_str(body)
        );
    }

    source
        .split('\n')
        .map(transform_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<indent>[ \t]*)(?:(?P<lhs>[\w.,\[\] ]+?)\s*=\s*)?(?P<esc>%|!)(?P<rest>[^%!=\s].*)$")
            .expect("static pattern")
    })
}

fn transform_line(line: &str) -> String {
    let Some(caps) = escape_line_regex().captures(line) else {
        return line.to_string();
    };
    let indent = &caps["indent"];
    let rest = &caps["rest"];
    let lhs = caps
        .name("lhs")
        .map(|m| format!("{} = ", m.as_str().trim_end()))
        .unwrap_or_default();

    match &caps["esc"] {
        "%" => {
            let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
            format!(
                "{}{}get_ipython().run_line_magic({}, {})",
                indent,
                lhs,
                repr_str(name),
                repr_str(args)
            )
        }
        _ if lhs.is_empty() => format!("{}get_ipython().system({})", indent, repr_str(rest)),
        _ => format!("{}{}get_ipython().getoutput({})", indent, lhs, repr_str(rest)),
    }
}

/// Exporter delegating to `jupyter nbconvert --to python`
#[derive(Debug, Clone)]
pub struct NbconvertScriptExporter {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ScriptExporter for NbconvertScriptExporter {
    fn to_script(&self, notebook: &Notebook) -> Result<String> {
        let input = tempfile::Builder::new()
            .prefix(".nbharness-")
            .suffix(".ipynb")
            .tempfile()?;
        notebook.save(input.path())?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(["nbconvert", "--to", "python", "--stdout"])
            .arg(input.path());
        let output = without_stalling_runtime(|| command.output())
            .map_err(|e| Error::EngineNotFound(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(Error::engine_failed(
                input.path(),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run blocking work, handing the worker thread's other tasks off first
///
/// Only a multi-threaded runtime can do the hand-off; elsewhere `f` just runs.
fn without_stalling_runtime<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_magic() {
        assert_eq!(
            transform_magics("%run \"Helper.ipynb\""),
            "get_ipython().run_line_magic('run', '\"Helper.ipynb\"')"
        );
        assert_eq!(
            transform_magics("if True:\n    %matplotlib notebook"),
            "if True:\n    get_ipython().run_line_magic('matplotlib', 'notebook')"
        );
    }

    #[test]
    fn test_cell_magic() {
        assert_eq!(
            transform_magics("%%bash\nmake PLATFORM=CW308\n"),
            "get_ipython().run_cell_magic('bash', '', 'make PLATFORM=CW308\\n')\n"
        );
    }

    #[test]
    fn test_shell_escape_and_assignment() {
        assert_eq!(transform_magics("!ls -la"), "get_ipython().system('ls -la')");
        assert_eq!(
            transform_magics("files = !ls"),
            "files = get_ipython().getoutput('ls')"
        );
    }

    #[test]
    fn test_plain_python_untouched() {
        let src = "x = a % b\nprint('100%')\ny = x != 3";
        assert_eq!(transform_magics(src), src);
    }

    #[test]
    fn test_export_layout() {
        let nb = Notebook::new(vec![Cell::markdown("# Setup"), Cell::code("scope = cw.scope()")]);
        let script = PythonScriptExporter.to_script(&nb).unwrap();
        assert!(script.starts_with("#!/usr/bin/env python\n"));
        assert!(script.contains("# # Setup\n"));
        assert!(script.contains("# In[ ]:\n\n\nscope = cw.scope()\n"));
    }

    fn shell_exporter(script: &str) -> NbconvertScriptExporter {
        NbconvertScriptExporter {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_nbconvert_export_outside_runtime() {
        let script = shell_exporter("printf 'x = 1\\n'")
            .to_script(&Notebook::new(vec![]))
            .unwrap();
        assert_eq!(script, "x = 1\n");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_nbconvert_export_keeps_runtime_responsive() {
        let ticker = tokio::spawn(async {
            let mut ticks = 0;
            while ticks < 5 {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                ticks += 1;
            }
            ticks
        });

        // Exports on the only worker thread; the ticker must keep running
        let export = tokio::spawn(async {
            shell_exporter("sleep 1; printf 'y = 2\\n'").to_script(&Notebook::new(vec![]))
        });
        let script = export.await.unwrap().unwrap();
        assert_eq!(script, "y = 2\n");
        assert!(ticker.is_finished());
        assert_eq!(ticker.await.unwrap(), 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_nbconvert_export_failure() {
        let err = shell_exporter("echo broken >&2; exit 3")
            .to_script(&Notebook::new(vec![]))
            .unwrap_err();
        assert!(matches!(err, Error::EngineFailed { .. }));
        assert!(err.to_string().contains("broken"));
    }
}
