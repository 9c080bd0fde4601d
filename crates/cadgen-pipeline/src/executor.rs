//! Run generated programs in a fresh interpreter

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::convention::Convention;
use crate::error::{PipelineError, Result};

/// Driver passed to `python -c`. Reads the program from stdin, compiles it
/// before running anything, executes it in a namespace holding only the
/// builtins, then writes a one-line JSON report to the original stdout.
/// Fd 1 is pointed at stderr first, so anything the program or native
/// libraries print lands in the run output instead of the report.
const DRIVER: &str = r#"
import json, os, sys, traceback

binding, attribute = sys.argv[1], sys.argv[2]
source = sys.stdin.read()

sys.stdout.flush()
report_fd = os.dup(1)
os.dup2(2, 1)

def report(payload):
    sys.stdout.flush()
    with os.fdopen(report_fd, "w") as out:
        out.write(json.dumps(payload))
    sys.exit(0)

try:
    compiled = compile(source, "<generated>", "exec")
except (SyntaxError, ValueError) as e:
    report({"status": "syntax", "message": str(e)})

namespace = {"__builtins__": __builtins__, "__name__": "__generated__"}
try:
    exec(compiled, namespace)
    result = namespace.get(binding)
    value = None if result is None else getattr(result, attribute, None)
except BaseException:
    report({"status": "runtime", "trace": traceback.format_exc()})

if value is None:
    report({"status": "missing_result", "binding": binding})
report({"status": "ok", "type_name": type(value).__name__})
"#;

/// A successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Type of the finished solid, e.g. `Part`
    pub result_type: String,
    /// Everything the program printed
    pub output: String,
    pub duration: Duration,
}

/// Something that can run a program that already passed the safety gate
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str, cancel: CancellationToken) -> Result<ExecOutcome>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Report {
    Ok { type_name: String },
    Syntax { message: String },
    Runtime { trace: String },
    MissingResult { binding: String },
}

/// Runs programs with a CPython subprocess per execution
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    interpreter: String,
    working_dir: PathBuf,
    timeout: Duration,
    binding: String,
    attribute: String,
}

impl PythonExecutor {
    pub fn new(
        interpreter: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
        convention: &Convention,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            working_dir: working_dir.into(),
            timeout,
            binding: convention.result_binding.to_string(),
            attribute: convention.result_attribute.to_string(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }
}

#[async_trait]
impl Executor for PythonExecutor {
    async fn execute(&self, code: &str, cancel: CancellationToken) -> Result<ExecOutcome> {
        let started = Instant::now();

        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(DRIVER)
            .arg(&self.binding)
            .arg(&self.attribute)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::Interpreter(format!(
                    "failed to start `{}`: {}",
                    self.interpreter, e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::Interpreter("failed to capture stdin".to_string()))?;
        stdin
            .write_all(code.as_bytes())
            .await
            .map_err(|e| PipelineError::Interpreter(format!("failed to send program: {}", e)))?;
        drop(stdin);

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Err(_) => return Err(PipelineError::Timeout { secs: self.timeout.as_secs() }),
                Ok(Err(e)) => {
                    return Err(PipelineError::Interpreter(format!("failed to wait for interpreter: {}", e)))
                }
                Ok(Ok(output)) => output,
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let duration = started.elapsed();
        tracing::debug!(
            "interpreter exited with {} after {:?}",
            output.status,
            duration
        );

        let report: Report = serde_json::from_str(stdout.trim()).map_err(|_| {
            let detail = if stderr.trim().is_empty() {
                format!("exited with {} and no report", output.status)
            } else {
                stderr.trim().to_string()
            };
            PipelineError::Interpreter(detail)
        })?;

        match report {
            Report::Ok { type_name } => Ok(ExecOutcome {
                result_type: type_name,
                output: stderr,
                duration,
            }),
            Report::Syntax { message } => Err(PipelineError::Syntax(message)),
            Report::Runtime { trace } => Err(PipelineError::Runtime(trace.trim_end().to_string())),
            Report::MissingResult { binding } => Err(PipelineError::MissingResult { binding }),
        }
    }
}
