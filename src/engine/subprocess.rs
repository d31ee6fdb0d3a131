//! Subprocess implementation of the analysis engine.
//!
//! Runs the engine as a bounded external process, passing the text and
//! flags as discrete arguments (never a concatenated shell string), and
//! captures stdout and stderr. The call is time-bounded: on expiry the
//! process is killed and an `EngineError::Timeout` is produced.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{AnalysisEngine, EngineError, EngineOutput, EngineRequest};

/// Configuration for the subprocess engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter or executable to run (e.g. `python3`).
    pub program: String,
    /// Script passed as the first argument, if the program is an
    /// interpreter.
    pub script: Option<PathBuf>,
    /// Wall-clock bound on one invocation, in seconds.
    pub timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some(PathBuf::from("ai_service/similarity.py")),
            timeout_seconds: 60,
        }
    }
}

/// Engine reached by spawning an external process per invocation.
pub struct SubprocessEngine {
    config: EngineConfig,
}

impl SubprocessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Build the command line for one request.
    ///
    /// Arguments stay discrete so text containing shell metacharacters is
    /// passed through verbatim.
    fn command(&self, request: &EngineRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        if let Some(script) = &self.config.script {
            cmd.arg(script);
        }
        cmd.arg("--text")
            .arg(&request.text)
            .arg("--format")
            .arg("json");
        if request.check_paraphrasing {
            cmd.arg("--paraphrasing");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // an expired or abandoned invocation must not leak the process
            .kill_on_drop(true);
        cmd
    }
}

impl Default for SubprocessEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl AnalysisEngine for SubprocessEngine {
    fn id(&self) -> &str {
        "subprocess-engine"
    }

    async fn invoke(&self, request: &EngineRequest) -> Result<EngineOutput, EngineError> {
        let mut cmd = self.command(request);
        let child = cmd.spawn().map_err(|e| {
            warn!(program = %self.config.program, "engine spawn failed: {e}");
            EngineError::Spawn(e.to_string())
        })?;

        let bound = Duration::from_secs(self.config.timeout_seconds);
        let output = match timeout(bound, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EngineError::Spawn(e.to_string())),
            Err(_) => {
                // dropping the wait future kills the child (kill_on_drop)
                warn!(
                    timeout_seconds = self.config.timeout_seconds,
                    "engine invocation timed out, process killed"
                );
                return Err(EngineError::Timeout(self.config.timeout_seconds));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // One merged buffer for diagnostics; stays server-side.
        let mut captured = stdout.to_string();
        if !stderr.is_empty() {
            if !captured.is_empty() && !captured.ends_with('\n') {
                captured.push('\n');
            }
            captured.push_str(&stderr);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(exit_code, output = %captured, "engine process failed");
            return Err(EngineError::Process {
                exit_code,
                output: captured,
            });
        }

        let payload: serde_json::Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            debug!(output = %captured, "engine output unparseable: {e}");
            EngineError::MalformedOutput(e.to_string())
        })?;

        if !payload.is_object() {
            return Err(EngineError::MalformedOutput(
                "expected a JSON object payload".to_string(),
            ));
        }

        Ok(EngineOutput::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Engine config that runs a scratch shell script through `sh`, so the
    /// `[script] --text ... --format json` argument contract is exercised
    /// without a real engine installed.
    fn script_engine(dir: &tempfile::TempDir, body: &str, timeout_seconds: u64) -> SubprocessEngine {
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, body).unwrap();
        SubprocessEngine::new(EngineConfig {
            program: "sh".to_string(),
            script: Some(script),
            timeout_seconds,
        })
    }

    #[tokio::test]
    async fn successful_invocation_parses_stdout_json() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(
            &dir,
            "echo '{\"similarityScore\": 12.5, \"aiDetected\": false}'\n",
            5,
        );

        let output = engine.invoke(&EngineRequest::new("some text")).await.unwrap();
        assert_eq!(output.payload["similarityScore"], 12.5);
        assert_eq!(output.payload["aiDetected"], false);
    }

    #[tokio::test]
    async fn arguments_are_passed_discretely() {
        let dir = tempfile::tempdir().unwrap();
        // script echoes back its positional arguments as a JSON array field
        let engine = script_engine(
            &dir,
            "printf '{\"error\": null, \"similarityScore\": 0, \"echo\": \"%s|%s|%s|%s\"}' \"$1\" \"$2\" \"$3\" \"$4\"\n",
            5,
        );

        let request = EngineRequest::new("tricky; rm -rf $(x)");
        let output = engine.invoke(&request).await.unwrap();
        assert_eq!(
            output.payload["echo"],
            "--text|tricky; rm -rf $(x)|--format|json"
        );
    }

    #[tokio::test]
    async fn paraphrasing_flag_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(
            &dir,
            "printf '{\"last\": \"%s\"}' \"$5\"\n",
            5,
        );

        let request = EngineRequest::new("text").with_paraphrasing(true);
        let output = engine.invoke(&request).await.unwrap();
        assert_eq!(output.payload["last"], "--paraphrasing");
    }

    #[tokio::test]
    async fn nonzero_exit_yields_process_failure_with_captured_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(
            &dir,
            "echo 'partial output'\necho 'diagnostic detail' >&2\nexit 3\n",
            5,
        );

        let err = engine.invoke(&EngineRequest::new("text")).await.unwrap_err();
        match err {
            EngineError::Process { exit_code, output } => {
                assert_eq!(exit_code, 3);
                assert!(output.contains("partial output"));
                assert!(output.contains("diagnostic detail"));
            }
            other => panic!("expected Process failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_stdout_yields_malformed_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(&dir, "echo 'this is not json'\n", 5);

        let err = engine.invoke(&EngineRequest::new("text")).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn non_object_json_yields_malformed_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(&dir, "echo '[1, 2, 3]'\n", 5);

        let err = engine.invoke(&EngineRequest::new("text")).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn slow_engine_is_killed_at_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(&dir, "sleep 30\necho '{}'\n", 1);

        let started = Instant::now();
        let err = engine.invoke(&EngineRequest::new("text")).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(1)));
        // well under the script's sleep: the process did not run to completion
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_yields_spawn_failure() {
        let engine = SubprocessEngine::new(EngineConfig {
            program: "definitely-not-a-real-binary-9f4e".to_string(),
            script: None,
            timeout_seconds: 5,
        });

        let err = engine.invoke(&EngineRequest::new("text")).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn(_)));
    }
}
