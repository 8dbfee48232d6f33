//! Execution driver
//!
//! Runs one notebook through the fixed pipeline
//!
//! ```text
//! Loaded -> ParametersApplied -> Inlined? -> PatternSubstituted? -> Executed -> Reported | Failed
//! ```
//!
//! and turns the executed notebook's error outputs into a verdict. Cell
//! errors are data here; only harness failures surface as [`Error`].

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::{strip_ansi, Error, Result};
use crate::engine::{ExecutionEngine, ExecutionRequest};
use crate::notebook::literal::{repr_str, repr_value, str_value};
use crate::notebook::{Notebook, Output, ScriptExporter};
use crate::preprocess::replace::escape_template;
use crate::preprocess::{
    inject_parameters, merge_layers, ParameterSet, ReferenceInliner, RuleSet, ShellGuard,
};
use crate::report::{self, ReportPaths};
use crate::testing::Transcript;

pub const DEFAULT_SCOPETYPE: &str = "OPENADC";
pub const DEFAULT_PLATFORM: &str = "CWLITEARM";
pub const DEFAULT_DISPLAY_BACKEND: &str = "inline";

/// Per-test switches taken out of the merged kwargs
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub serial_number: Option<String>,
    pub baud: Option<String>,
    /// Exception names that do not fail the test; empty means none are allowed
    pub allowable_exceptions: Vec<String>,
    pub print_first_traceback_only: bool,
    pub print_stdout: bool,
    pub print_stderr: bool,
    pub export: bool,
    pub allow_errors: bool,
    /// Replaces `%matplotlib notebook`; `None` leaves it alone
    pub display_backend: Option<String>,
    /// Extra pattern/template pairs, applied after the built-in rules
    pub replacements: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            serial_number: None,
            baud: None,
            allowable_exceptions: Vec::new(),
            print_first_traceback_only: true,
            print_stdout: false,
            print_stderr: false,
            export: true,
            allow_errors: true,
            display_backend: Some(DEFAULT_DISPLAY_BACKEND.to_string()),
            replacements: Vec::new(),
        }
    }
}

fn option_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::Config(format!("'{}' must be true or false", key)))
}

fn option_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(str_value(other)),
    }
}

fn option_names(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::Config(format!("'{}' entries must be strings", key))
                })
            })
            .collect(),
        _ => Err(Error::Config(format!(
            "'{}' must be a name or a list of names",
            key
        ))),
    }
}

fn option_pairs(key: &str, value: &Value) -> Result<Vec<(String, String)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(map) => map
            .iter()
            .map(|(pattern, template)| match (pattern.as_str(), template) {
                (Some(p), t) if !t.is_mapping() && !t.is_sequence() => {
                    Ok((p.to_string(), str_value(t)))
                }
                _ => Err(Error::Config(format!(
                    "'{}' must map patterns to replacement strings",
                    key
                ))),
            })
            .collect(),
        _ => Err(Error::Config(format!("'{}' must be a mapping", key))),
    }
}

impl RunOptions {
    /// Separate driver options from notebook parameters
    ///
    /// Option keys are consumed here and never injected into the notebook.
    pub fn split(kwargs: &ParameterSet) -> Result<(RunOptions, ParameterSet)> {
        let mut options = RunOptions::default();
        let mut params = ParameterSet::new();

        for (key, value) in kwargs {
            match key.as_str() {
                "serial_number" => options.serial_number = option_scalar(value),
                "baud" => options.baud = option_scalar(value),
                "allowable_exceptions" => {
                    options.allowable_exceptions = option_names(key, value)?
                }
                "print_first_traceback_only" => {
                    options.print_first_traceback_only = option_bool(key, value)?
                }
                "print_stdout" => options.print_stdout = option_bool(key, value)?,
                "print_stderr" => options.print_stderr = option_bool(key, value)?,
                "export" => options.export = option_bool(key, value)?,
                "allow_errors" => options.allow_errors = option_bool(key, value)?,
                "display_backend" => options.display_backend = option_scalar(value),
                "replacements" => options.replacements = option_pairs(key, value)?,
                _ => {
                    params.insert(key.clone(), value.clone());
                }
            }
        }
        Ok((options, params))
    }

    /// Rules implied by the options, in application order
    ///
    /// Fails on a malformed user pattern, before anything runs.
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut rules = RuleSet::new();
        if let Some(sn) = &self.serial_number {
            let sn = escape_template(sn);
            rules.add(r"cw.scope\(\)", format!("cw.scope(sn='{}')", sn))?;
            rules.add(
                r"chipwhisperer\.scope\(\)",
                format!("chipwhisperer.scope(sn='{}')", sn),
            )?;
        }
        if let Some(baud) = &self.baud {
            rules.add(
                r"(program_target\(.*)\)",
                format!("${{1}}, baud={})", escape_template(baud)),
            )?;
        }
        if let Some(backend) = &self.display_backend {
            rules.add(
                "%matplotlib notebook",
                format!("%matplotlib {}", escape_template(backend)),
            )?;
        }
        for (pattern, template) in &self.replacements {
            rules.add(pattern, template.clone())?;
        }
        Ok(rules)
    }
}

/// An error output recorded by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    /// 1-based cell index
    pub cell: usize,
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}

/// Every error output in the notebook, in cell order
pub fn collect_errors(notebook: &Notebook) -> Vec<CellError> {
    notebook
        .code_cells()
        .flat_map(|(index, cell)| {
            cell.outputs.iter().filter_map(move |output| match output {
                Output::Error(e) => Some(CellError {
                    cell: index + 1,
                    ename: e.ename.clone(),
                    evalue: e.evalue.clone(),
                    traceback: e.traceback.clone(),
                }),
                _ => None,
            })
        })
        .collect()
}

/// Outcome of checking errors against the allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    PassedWithExpectedErrors,
    Failed,
}

impl Verdict {
    pub fn passed(self) -> bool {
        !matches!(self, Verdict::Failed)
    }
}

pub fn classify(errors: &[CellError], allowable: &[String]) -> Verdict {
    if errors.is_empty() {
        Verdict::Passed
    } else if !allowable.is_empty() && errors.iter().all(|e| allowable.contains(&e.ename)) {
        Verdict::PassedWithExpectedErrors
    } else {
        Verdict::Failed
    }
}

/// Pipeline states, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    ParametersApplied,
    Inlined,
    PatternSubstituted,
    Executed,
    Reported,
    Failed,
}

/// An executed notebook and what was found in it
#[derive(Debug, Clone)]
pub struct Execution {
    pub notebook: Notebook,
    pub errors: Vec<CellError>,
    pub scope_type: String,
    pub platform: String,
    pub stages: Vec<Stage>,
}

/// Result of one `test_notebook` call
#[derive(Debug, Clone)]
pub struct NotebookOutcome {
    pub passed: bool,
    pub verdict: Verdict,
    pub errors: Vec<CellError>,
    pub stages: Vec<Stage>,
    pub report: Option<ReportPaths>,
}

/// Python-style rendering of the kwargs, for the transcript
fn format_kwargs(params: &ParameterSet) -> String {
    let items: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}: {}", repr_str(k), repr_value(v)))
        .collect();
    format!("{{{}}}", items.join(", "))
}

fn write_tracebacks(errors: &[CellError], transcript: &mut Transcript) {
    for error in errors {
        transcript.line(format!(
            "Test failed in cell {}: {}: {}",
            error.cell, error.ename, error.evalue
        ));
        for line in &error.traceback {
            transcript.line(strip_ansi(line));
        }
    }
}

fn write_streams(notebook: &Notebook, name: &str, transcript: &mut Transcript) {
    for (index, cell) in notebook.code_cells() {
        for output in &cell.outputs {
            if let Output::Stream(stream) = output {
                if stream.name == name {
                    transcript.line(format!("[{}]:\n{}", index + 1, stream.text.as_str()));
                }
            }
        }
    }
}

/// Prepares, executes and judges notebooks
#[derive(Clone)]
pub struct Driver {
    engine: Arc<dyn ExecutionEngine>,
    exporter: Arc<dyn ScriptExporter>,
    capture_path: String,
    all_tracebacks: bool,
}

impl Driver {
    pub fn new(engine: Arc<dyn ExecutionEngine>, exporter: Arc<dyn ScriptExporter>) -> Self {
        Self {
            engine,
            exporter,
            capture_path: ShellGuard::default().capture_path().to_string(),
            all_tracebacks: false,
        }
    }

    /// Report every traceback of a failing notebook regardless of kwargs
    pub fn with_all_tracebacks(mut self) -> Self {
        self.all_tracebacks = true;
        self
    }

    pub fn with_capture_path(mut self, capture_path: impl Into<String>) -> Self {
        self.capture_path = capture_path.into();
        self
    }

    /// Load, rewrite and execute a notebook; no verdict is formed here
    pub async fn execute_notebook(
        &self,
        path: &Path,
        options: &RunOptions,
        params: &ParameterSet,
    ) -> Result<Execution> {
        let rules = options.rule_set()?;

        let mut notebook = Notebook::load(path)?;
        let mut stages = vec![Stage::Loaded];

        let defaults: ParameterSet = [
            ("SCOPETYPE", DEFAULT_SCOPETYPE),
            ("PLATFORM", DEFAULT_PLATFORM),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
        let overrides = merge_layers([&defaults, params]);
        let scope_type = overrides.get("SCOPETYPE").map(str_value).unwrap_or_default();
        let platform = overrides.get("PLATFORM").map(str_value).unwrap_or_default();

        inject_parameters(&mut notebook, &overrides);
        stages.push(Stage::ParametersApplied);

        let notebook_dir = path.parent().unwrap_or(Path::new(""));

        if options.serial_number.is_some() || options.baud.is_some() {
            let inlined = ReferenceInliner::new(notebook_dir, self.exporter.as_ref())
                .inline_notebook(&mut notebook)?;
            let guarded = ShellGuard::new(self.capture_path.clone()).guard_notebook(&mut notebook);
            tracing::debug!("Inlined {} references, guarded {} shell cells", inlined, guarded);
            stages.push(Stage::Inlined);
        }

        if !rules.is_empty() {
            let changed = rules.apply(&mut notebook);
            tracing::debug!("Applied {} rules, {} cells changed", rules.len(), changed);
            stages.push(Stage::PatternSubstituted);
        }

        let request = ExecutionRequest::new(notebook_dir, options.allow_errors);
        tracing::info!("Executing {}", path.display());
        let notebook = self.engine.execute(&notebook, &request).await?;
        stages.push(Stage::Executed);

        let errors = collect_errors(&notebook);
        Ok(Execution {
            notebook,
            errors,
            scope_type,
            platform,
            stages,
        })
    }

    /// Run one notebook test, writing progress to the transcript
    pub async fn test_notebook(
        &self,
        path: &Path,
        output_dir: &Path,
        kwargs: &ParameterSet,
        transcript: &mut Transcript,
    ) -> Result<NotebookOutcome> {
        let (mut options, params) = RunOptions::split(kwargs)?;
        if self.all_tracebacks {
            options.print_first_traceback_only = false;
        }

        let shown: PathBuf = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        transcript.line(format!("Testing: {}:...", shown.display()));
        transcript.line(format!("with {}.", format_kwargs(&params)));
        match &options.serial_number {
            Some(sn) => transcript.line(format!("on device with serial number {}.", sn)),
            None => transcript
                .line("No serial number specified... only bad if more than one device attached."),
        }

        let Execution {
            notebook,
            errors,
            scope_type,
            platform,
            mut stages,
        } = self.execute_notebook(path, &options, &params).await?;

        let verdict = classify(&errors, &options.allowable_exceptions);
        match verdict {
            Verdict::Passed => transcript.line("PASSED"),
            Verdict::PassedWithExpectedErrors => {
                transcript.line("PASSED with expected errors");
                for error in &errors {
                    transcript.line(format!("{} : {}", error.ename, error.evalue));
                }
            }
            Verdict::Failed => {
                if options.allowable_exceptions.is_empty() {
                    transcript.line("FAILED:");
                } else {
                    transcript.line(format!(
                        "FAILED {} config {}:",
                        path.display(),
                        format_kwargs(&params)
                    ));
                }
                let shown = if options.print_first_traceback_only {
                    &errors[..1]
                } else {
                    &errors[..]
                };
                write_tracebacks(shown, transcript);
            }
        }

        let mut report = None;
        if verdict.passed() {
            if options.export {
                report = Some(report::export_notebook(
                    &notebook,
                    path,
                    output_dir,
                    &scope_type,
                    &platform,
                    transcript,
                )?);
                stages.push(Stage::Reported);
            }
        } else {
            stages.push(Stage::Failed);
        }

        if options.print_stdout {
            write_streams(&notebook, "stdout", transcript);
        }
        if options.print_stderr {
            write_streams(&notebook, "stderr", transcript);
        }

        tracing::info!("{} {:?}", path.display(), verdict);
        Ok(NotebookOutcome {
            passed: verdict.passed(),
            verdict,
            errors,
            stages,
            report,
        })
    }
}
