//! Execution engine boundary and the Jupyter implementation.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::notebook::{CellOutputs, Notebook};

/// Interval between child process status checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine-level execution failure.
///
/// Errors raised *by the executed code* are not `ExecError`s; they arrive as
/// error outputs of the failing cell.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Engine executable could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// Wall-clock limit exceeded; the engine was killed.
    #[error("execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// Engine exited non-zero.
    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },
    /// Scratch file I/O failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Engine produced an unreadable or mismatched notebook.
    #[error("invalid notebook from engine: {0}")]
    Notebook(String),
}

/// Runs an ordered sequence of code blocks in one shared session.
///
/// Implementations return one output list per source, in order. Failures of
/// the executed code are reported as error outputs; only engine failures
/// (cannot start, timed out, crashed) are returned as `Err`.
pub trait ExecutionEngine: Send + Sync {
    /// Execute `sources` with `working_dir` as the current directory.
    fn execute(
        &self,
        sources: &[String],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<Vec<CellOutputs>, ExecError>;
}

/// Executes blocks as a notebook through `jupyter nbconvert`.
#[derive(Debug, Clone)]
pub struct JupyterEngine {
    jupyter: String,
    kernel: String,
}

impl JupyterEngine {
    /// Create an engine using the `jupyter` executable and kernel name.
    #[must_use]
    pub fn new(jupyter: impl Into<String>, kernel: impl Into<String>) -> Self {
        Self {
            jupyter: jupyter.into(),
            kernel: kernel.into(),
        }
    }

    fn build_command(&self, input: &Path, output_dir: &Path, timeout: Duration) -> Command {
        let mut cmd = Command::new(&self.jupyter);
        cmd.arg("nbconvert")
            .arg("--to")
            .arg("notebook")
            .arg("--execute")
            .arg("--allow-errors")
            .arg(format!("--ExecutePreprocessor.kernel_name={}", self.kernel))
            .arg(format!("--ExecutePreprocessor.timeout={}", timeout.as_secs()))
            .arg("--output-dir")
            .arg(output_dir)
            .arg("--output")
            .arg("executed")
            .arg(input);
        cmd
    }
}

impl ExecutionEngine for JupyterEngine {
    fn execute(
        &self,
        sources: &[String],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<Vec<CellOutputs>, ExecError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ExecError::Io { path, source }
        };

        // nbconvert runs the kernel in the notebook's directory, so the input
        // lives next to the source file for the duration of the run.
        let notebook = Notebook::from_sources(sources, &self.kernel);
        let input = tempfile::Builder::new()
            .prefix(".weft-exec-")
            .suffix(".ipynb")
            .tempfile_in(working_dir)
            .map_err(io_err(working_dir))?;
        serde_json::to_writer(input.as_file(), &notebook)
            .map_err(|e| ExecError::Notebook(e.to_string()))?;

        let output_dir = tempfile::TempDir::new().map_err(io_err(working_dir))?;
        let mut stderr_file = tempfile::tempfile().map_err(io_err(output_dir.path()))?;
        let stderr_handle = stderr_file.try_clone().map_err(io_err(output_dir.path()))?;

        let command_line = format!("{} nbconvert", self.jupyter);
        let mut child = self
            .build_command(input.path(), output_dir.path(), timeout)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    tracing::warn!(dir = %working_dir.display(), "execution timed out, killing engine");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecError::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(ExecError::Spawn {
                        command: command_line,
                        source,
                    });
                }
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            let _ = stderr_file.seek(SeekFrom::Start(0));
            let _ = stderr_file.read_to_string(&mut stderr);
            return Err(ExecError::Failed {
                command: command_line,
                stderr: stderr.trim().to_owned(),
            });
        }

        let executed_path = output_dir.path().join("executed.ipynb");
        let file = File::open(&executed_path).map_err(io_err(&executed_path))?;
        let executed: Notebook =
            serde_json::from_reader(file).map_err(|e| ExecError::Notebook(e.to_string()))?;
        let outputs = executed.code_outputs();
        if outputs.len() != sources.len() {
            return Err(ExecError::Notebook(format!(
                "expected {} code cells, found {}",
                sources.len(),
                outputs.len()
            )));
        }
        let _ = fs::remove_file(&executed_path);
        Ok(outputs)
    }
}
