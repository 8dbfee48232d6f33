//! Run orchestrator
//!
//! Fans out one worker task per connected hardware unit. Each worker walks
//! the tutorials assigned to its unit in order; the parent collects the
//! results in submission order and writes one log file per unit.

use colored::Colorize;
use indexmap::IndexMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::driver::Driver;

use super::config::{test_parameters, HarnessConfig};
use super::Transcript;

/// Pass/fail counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub run: usize,
    pub failed: usize,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.run += other.run;
        self.failed += other.failed;
    }
}

/// What one worker produced
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub tally: Tally,
    /// `"<Passed|Failed> <notebook> with config <id>\n"` to transcript text
    pub tests: IndexMap<String, String>,
}

/// Aggregated results of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub all: Tally,
    /// Per-unit tallies, indexed by unit id
    pub units: Vec<Tally>,
    pub tests: IndexMap<String, String>,
}

/// Everything a worker needs besides the configuration
#[derive(Clone)]
pub struct RunContext {
    pub notebook_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Scratch directory notebooks create; removed after the run
    pub work_dir: PathBuf,
    pub driver: Driver,
    pub cleanup: bool,
}

/// Run every configuration assigned to hardware unit `id`
pub async fn run_hw_config(
    id: usize,
    config: &HarnessConfig,
    ctx: &RunContext,
) -> Result<WorkerReport> {
    let hardware = config
        .connected
        .get(id)
        .ok_or_else(|| Error::Config(format!("No connected hardware unit {}", id)))?;
    tracing::debug!("HW kwargs: {:?}", hardware.kwargs);

    let mut report = WorkerReport::default();
    for (notebook, run) in config.runs_for(id) {
        let kwargs = test_parameters(hardware, run);
        let path = ctx.notebook_dir.join(notebook);
        tracing::info!("Testing {} with {} ({:?})", notebook, id, kwargs);

        let mut transcript = Transcript::new();
        let outcome = ctx
            .driver
            .test_notebook(&path, &ctx.output_dir, &kwargs, &mut transcript)
            .await?;

        report.tally.run += 1;
        if !outcome.passed {
            report.tally.failed += 1;
        }
        let header = format!(
            "{} {} with config {}\n",
            if outcome.passed { "Passed" } else { "Failed" },
            notebook,
            id
        );
        report.tests.insert(header, transcript.text());
    }
    Ok(report)
}

/// Copy `<notebook_dir>/img/*` into `<output_dir>/img/`
pub fn copy_images(notebook_dir: &Path, output_dir: &Path) -> Result<usize> {
    let source = notebook_dir.join("img");
    let target = output_dir.join("img");
    std::fs::create_dir_all(&target)?;

    print!("Copying over image files...");
    let _ = std::io::stdout().flush();

    let mut copied = 0;
    if source.is_dir() {
        for entry in std::fs::read_dir(&source)? {
            let path = entry?.path();
            if let (true, Some(name)) = (path.is_file(), path.file_name()) {
                let dest = target.join(name);
                std::fs::copy(&path, &dest).map_err(|e| Error::file_write(&dest, e))?;
                copied += 1;
            }
        }
    }
    println!("Done");
    Ok(copied)
}

/// Write `config_<index>_log.txt` with each test's transcript
pub fn write_worker_log(
    log_dir: &Path,
    index: usize,
    tests: &IndexMap<String, String>,
) -> Result<PathBuf> {
    let path = log_dir.join(format!("config_{}_log.txt", index));
    let mut content = String::new();
    for (header, output) in tests {
        content.push_str(&format!("Test {}, output:\n{}", header, output));
    }
    std::fs::create_dir_all(log_dir).map_err(|e| Error::file_write(log_dir, e))?;
    std::fs::write(&path, content).map_err(|e| Error::file_write(&path, e))?;
    Ok(path)
}

/// Remove the scratch directory; an absent directory is fine
pub fn remove_work_dir(work_dir: &Path) {
    match std::fs::remove_dir_all(work_dir) {
        Ok(()) => tracing::debug!("Removed {}", work_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", work_dir.display(), e),
    }
}

/// Run every tutorial configuration against every connected unit
///
/// Each worker loads the configuration itself. If any worker fails, the
/// others are aborted and the partial results are dropped; the scratch
/// directory is still cleaned up.
pub async fn run_tests(config_path: &Path, ctx: Arc<RunContext>) -> Result<RunSummary> {
    let config = HarnessConfig::load(config_path)?;
    copy_images(&ctx.notebook_dir, &ctx.output_dir)?;

    let units = config.connected.len();
    tracing::info!("Starting {} workers", units);

    let mut handles: Vec<JoinHandle<Result<WorkerReport>>> = Vec::with_capacity(units);
    for id in 0..units {
        let ctx = Arc::clone(&ctx);
        let config_path = config_path.to_path_buf();
        handles.push(tokio::spawn(async move {
            let config = HarnessConfig::load(&config_path)?;
            let report = run_hw_config(id, &config, &ctx).await?;
            tracing::info!(
                "Worker {} finished: {} run, {} failed",
                id,
                report.tally.run,
                report.tally.failed
            );
            Ok(report)
        }));
    }

    let mut summary = RunSummary::default();
    let mut failure = None;
    for (index, handle) in handles.iter_mut().enumerate() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Worker {
                unit: index,
                message: e.to_string(),
            }),
        };
        match result {
            Ok(report) => {
                summary.all.add(report.tally);
                summary.units.push(report.tally);
                if let Err(e) = write_worker_log(&ctx.log_dir, index, &report.tests) {
                    failure = Some(e);
                    break;
                }
                summary.tests.extend(report.tests);
            }
            Err(e) => {
                let e = match e {
                    Error::Worker { .. } => e,
                    other => Error::Worker {
                        unit: index,
                        message: other.to_string(),
                    },
                };
                failure = Some(e);
                break;
            }
        }
    }

    if failure.is_some() {
        for handle in &handles {
            handle.abort();
        }
    }
    if ctx.cleanup {
        remove_work_dir(&ctx.work_dir);
    }

    match failure {
        Some(e) => {
            tracing::error!("{}", e);
            Err(e)
        }
        None => Ok(summary),
    }
}

/// Print per-unit and overall tallies
pub fn print_summary(summary: &RunSummary) {
    fn line(label: &str, tally: Tally) -> String {
        let counts = format!("{} run, {} failed", tally.run, tally.failed);
        let counts = if tally.failed == 0 {
            counts.green()
        } else {
            counts.red()
        };
        format!("  {:<10} {}", label, counts)
    }

    println!("\n{}", "Summary:".blue().bold());
    for (index, tally) in summary.units.iter().enumerate() {
        println!("{}", line(&format!("unit {}", index), *tally));
    }
    println!("{}", line("all", summary.all).bold());

    for header in summary.tests.keys() {
        let header = header.trim_end();
        if header.starts_with("Passed") {
            println!("  {} {}", "✓".green(), header);
        } else {
            println!("  {} {}", "✗".red(), header);
        }
    }
}
