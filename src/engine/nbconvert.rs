//! `jupyter nbconvert --execute` subprocess engine

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{ExecutionEngine, ExecutionRequest};
use crate::common::{Error, Result};
use crate::notebook::Notebook;

/// Runs notebooks through `nbconvert` with no execution timeout
#[derive(Debug, Clone)]
pub struct NbconvertEngine {
    program: PathBuf,
    args: Vec<String>,
    kernel: String,
}

impl NbconvertEngine {
    pub fn new(program: PathBuf, args: Vec<String>, kernel: impl Into<String>) -> Self {
        Self {
            program,
            args,
            kernel: kernel.into(),
        }
    }

    fn command_args(&self, allow_errors: bool) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(
            ["nbconvert", "--to", "notebook", "--execute"]
                .iter()
                .map(|s| s.to_string()),
        );
        if allow_errors {
            args.push("--allow-errors".to_string());
        }
        args.push("--ExecutePreprocessor.timeout=-1".to_string());
        args.push(format!("--ExecutePreprocessor.kernel_name={}", self.kernel));
        args.push("--stdout".to_string());
        args
    }
}

#[async_trait]
impl ExecutionEngine for NbconvertEngine {
    async fn execute(&self, notebook: &Notebook, request: &ExecutionRequest) -> Result<Notebook> {
        // The kernel's cwd follows the input file, so the copy lives next to the original
        let input = tempfile::Builder::new()
            .prefix(".nbharness-")
            .suffix(".ipynb")
            .tempfile_in(&request.working_dir)?;
        notebook.save(input.path())?;
        // The child runs inside working_dir, so a relative path would resolve twice
        let input_path = std::path::absolute(input.path())?;

        let args = self.command_args(request.allow_errors);
        tracing::debug!("Executing {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .arg(&input_path)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::EngineNotFound(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let message = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(Error::engine_failed(
                input.path(),
                format!("exit status {:?}\n{}", output.status.code(), message),
            ));
        }

        let executed = String::from_utf8_lossy(&output.stdout);
        Notebook::parse(&executed).map_err(|e| Error::engine_failed(input.path(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let engine = NbconvertEngine::new(PathBuf::from("jupyter"), vec![], "python3");
        let args = engine.command_args(true);
        assert_eq!(&args[..4], &["nbconvert", "--to", "notebook", "--execute"]);
        assert!(args.contains(&"--allow-errors".to_string()));
        assert!(args.contains(&"--ExecutePreprocessor.timeout=-1".to_string()));
        assert!(args.contains(&"--ExecutePreprocessor.kernel_name=python3".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--stdout"));

        assert!(!engine
            .command_args(false)
            .contains(&"--allow-errors".to_string()));
    }

    #[test]
    fn test_prefix_args_come_first() {
        let engine = NbconvertEngine::new(
            PathBuf::from("python3"),
            vec!["-m".to_string(), "jupyter".to_string()],
            "python3",
        );
        assert_eq!(&engine.command_args(true)[..3], &["-m", "jupyter", "nbconvert"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = NbconvertEngine::new(
            PathBuf::from("/nonexistent/nbharness-engine"),
            vec![],
            "python3",
        );
        let err = engine
            .execute(
                &Notebook::new(vec![]),
                &ExecutionRequest::new(dir.path(), true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineNotFound(_)));
    }

    /// State letter from `/proc/<pid>/stat`, or `None` once the process is gone
    #[cfg(target_os = "linux")]
    fn process_state(pid: &str) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_aborted_execution_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("engine.pid");
        let script = dir.path().join("engine.sh");
        std::fs::write(
            &script,
            format!("echo $$ > '{}'\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();

        let engine = NbconvertEngine::new(
            PathBuf::from("/bin/sh"),
            vec![script.display().to_string()],
            "python3",
        );
        let request = ExecutionRequest::new(dir.path(), true);
        let task = tokio::spawn(async move {
            engine.execute(&Notebook::new(vec![]), &request).await
        });

        let mut pid = String::new();
        for _ in 0..100 {
            pid = std::fs::read_to_string(&pid_file).unwrap_or_default();
            if !pid.trim().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        let pid = pid.trim().to_string();
        assert!(!pid.is_empty(), "engine never started");
        assert!(process_state(&pid).is_some());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let mut alive = true;
        for _ in 0..40 {
            alive = !matches!(process_state(&pid), None | Some('Z') | Some('X'));
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!alive, "engine process {} still running", pid);
    }
}
