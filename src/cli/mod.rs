//! CLI command handling
//!
//! Builds the engine and driver from settings plus flags, and dispatches
//! each subcommand.

use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::Commands;
use crate::common::config::{ScriptExport, Settings};
use crate::common::{Error, Result};
use crate::driver::Driver;
use crate::engine::NbconvertEngine;
use crate::notebook::{NbconvertScriptExporter, PythonScriptExporter, ScriptExporter};
use crate::preprocess::clear::{clear_outputs_in_dir, default_clear_parameters};
use crate::preprocess::ParameterSet;
use crate::testing::{print_summary, run_tests, RunContext, Transcript};

/// Build the driver, resolving the engine program
pub fn build_driver(settings: &Settings, engine: Option<PathBuf>) -> Result<Driver> {
    let mut settings = settings.clone();
    if let Some(program) = engine {
        settings.engine.program = program;
    }
    let program = settings.resolve_engine()?;
    tracing::debug!("Using engine {}", program.display());

    let exporter: Arc<dyn ScriptExporter> = match settings.engine.script_export {
        ScriptExport::Native => Arc::new(PythonScriptExporter),
        ScriptExport::Nbconvert => Arc::new(NbconvertScriptExporter {
            program: program.clone(),
            args: settings.engine.args.clone(),
        }),
    };
    let engine = NbconvertEngine::new(
        program,
        settings.engine.args.clone(),
        settings.engine.kernel.clone(),
    );

    Ok(Driver::new(Arc::new(engine), exporter)
        .with_capture_path(settings.shell.capture_path.clone()))
}

/// Parse `KEY=VALUE` pairs; values are YAML scalars or collections
pub fn parse_params(pairs: &[String]) -> Result<ParameterSet> {
    let mut params = ParameterSet::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Expected KEY=VALUE, got '{}'", pair)))?;
        let value = serde_yaml::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Run {
            config,
            notebook_dir,
            output_dir,
            log_dir,
            engine,
            all_tracebacks,
            no_cleanup,
        } => {
            let mut driver = build_driver(&settings, engine)?;
            if all_tracebacks {
                driver = driver.with_all_tracebacks();
            }
            let ctx = RunContext {
                notebook_dir: notebook_dir.unwrap_or(settings.paths.notebook_dir),
                output_dir: output_dir.unwrap_or(settings.paths.output_dir),
                log_dir: log_dir.unwrap_or(settings.paths.log_dir),
                work_dir: settings.paths.work_dir,
                driver,
                cleanup: !no_cleanup,
            };

            let summary = run_tests(&config, Arc::new(ctx)).await?;
            print_summary(&summary);

            if summary.all.failed > 0 {
                return Err(Error::TestsFailed {
                    failed: summary.all.failed,
                    run: summary.all.run,
                });
            }
            Ok(())
        }

        Commands::Test {
            notebook,
            output_dir,
            engine,
            params,
        } => {
            let driver = build_driver(&settings, engine)?;
            let kwargs = parse_params(&params)?;
            let output_dir = output_dir.unwrap_or(settings.paths.output_dir);
            std::fs::create_dir_all(&output_dir)?;

            let mut transcript = Transcript::new();
            let outcome = driver
                .test_notebook(&notebook, &output_dir, &kwargs, &mut transcript)
                .await?;
            if !outcome.passed {
                return Err(Error::TestsFailed { failed: 1, run: 1 });
            }
            Ok(())
        }

        Commands::Clear {
            dir,
            include,
            exclude,
            keep_parameters,
        } => {
            let defaults = if keep_parameters {
                ParameterSet::new()
            } else {
                default_clear_parameters()
            };
            let cleared = clear_outputs_in_dir(&dir, &include, &exclude, &defaults)?;
            tracing::info!("Cleared {} notebooks in {}", cleared.len(), dir.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "PLATFORM=CWNANO".to_string(),
            "baud=38400".to_string(),
            "allowable_exceptions=[OSError, ValueError]".to_string(),
            "NAME=a: b".to_string(),
        ])
        .unwrap();
        assert_eq!(params["PLATFORM"], Value::String("CWNANO".into()));
        assert_eq!(params["baud"], Value::Number(38400.into()));
        assert!(params["allowable_exceptions"].is_sequence());
        assert!(params.contains_key("NAME"));
    }

    #[test]
    fn test_parse_params_requires_equals() {
        assert!(parse_params(&["PLATFORM".to_string()]).unwrap_err().is_config());
    }

    #[test]
    fn test_missing_engine() {
        let settings = Settings::default();
        let result = build_driver(
            &settings,
            Some(PathBuf::from("/definitely/not/here/jupyter")),
        );
        assert!(matches!(result, Err(Error::EngineNotFound(_))));
    }
}
