//! Script Code Executor
//!
//! Runs code artifacts as child processes:
//! - Artifact lookup inside a fixed artifacts directory
//! - Interpreter selection by file extension
//! - JSON input on stdin, JSON (or plain text) result on stdout
//! - Timeout and stderr capture on failure
//!
//! This is a plain subprocess runner, not a sandbox; hosts that need
//! isolation plug in their own [`CodeExecutor`].

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CodeExecutor, ExecutorError};

/// Default time a single artifact may run.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interpreter used for each supported artifact extension.
static INTERPRETERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("sh", "bash"),
        ("bash", "bash"),
        ("js", "node"),
        ("mjs", "node"),
        ("cjs", "node"),
        ("py", "python3"),
    ])
});

/// Runs artifacts found under a directory with the matching interpreter.
#[derive(Debug, Clone)]
pub struct ScriptCodeExecutor {
    artifacts_dir: PathBuf,
    timeout: Duration,
}

impl ScriptCodeExecutor {
    /// Creates an executor for artifacts stored in `artifacts_dir`.
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            timeout: DEFAULT_CODE_TIMEOUT,
        }
    }

    /// Sets the per-artifact timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves an artifact reference to a file inside the artifacts directory.
    ///
    /// References may not be absolute or climb out with `..`.
    fn resolve_artifact(&self, artifact: &str) -> Result<PathBuf, ExecutorError> {
        let relative = Path::new(artifact);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if artifact.trim().is_empty() || escapes {
            return Err(ExecutorError::ArtifactNotFound(artifact.to_string()));
        }

        let path = self.artifacts_dir.join(relative);
        if !path.is_file() {
            return Err(ExecutorError::ArtifactNotFound(artifact.to_string()));
        }
        Ok(path)
    }
}

/// Picks the interpreter for an artifact from its extension.
fn interpreter_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    INTERPRETERS.get(extension.as_str()).copied()
}

/// Interprets a successful run's stdout.
///
/// Empty output is `null`; valid JSON is parsed; anything else is returned
/// as a trimmed string.
fn parse_stdout(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[async_trait]
impl CodeExecutor for ScriptCodeExecutor {
    async fn execute(&self, artifact: &str, input: Value) -> Result<Value, ExecutorError> {
        let script_path = self.resolve_artifact(artifact)?;
        let interpreter = interpreter_for(&script_path)
            .ok_or_else(|| ExecutorError::UnsupportedArtifact(artifact.to_string()))?;

        debug!("Running artifact '{}' with {}", artifact, interpreter);

        let mut child = Command::new(interpreter)
            .arg(&script_path)
            .current_dir(&self.artifacts_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let payload = serde_json::to_vec(&input).map_err(|e| ExecutorError::failed(e.to_string()))?;
        let stdin = child.stdin.take();

        // Feeding stdin and draining stdout/stderr happen together, so a child
        // that writes before it reads cannot stall on a full pipe
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                // Scripts that ignore their input may exit before reading it
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    warn!("Artifact '{}' closed stdin before reading input", artifact);
                    Ok(())
                }
                result => result,
            }
        };

        let run = async { tokio::join!(feed, child.wait_with_output()) };
        let (fed, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout))?;
        fed?;
        let output = output?;

        if output.status.success() {
            return Ok(parse_stdout(&output.stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "Artifact '{}' failed with exit code: {:?}",
            artifact,
            output.status.code()
        );

        let message = if stderr.trim().is_empty() {
            format!("artifact '{}' exited with code {:?}", artifact, output.status.code())
        } else {
            stderr.trim().to_string()
        };
        Err(ExecutorError::Failed(message))
    }
}
