//! The sandbox executor client (spec §4.10): frames a request to an
//! external isolated process over stdin/stdout JSON and races it
//! against a timeout. Isolation itself (no network egress, read-only
//! root, dropped capabilities) is the collaborator's contract, not
//! enforced here.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::{MxfError, MxfResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Typescript,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub agent_id: String,
    pub channel_id: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub timeout_ms: u64,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    pub output: serde_json::Value,
    pub logs: Vec<String>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
    pub timeout: bool,
}

/// Invokes `program` as the sandbox collaborator: writes the framed JSON
/// request to its stdin, closes it, and reads exactly one JSON response
/// from stdout before the process exits or the timeout elapses.
pub struct SandboxExecutor {
    program: String,
    args: Vec<String>,
}

impl SandboxExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub async fn execute(&self, request: ExecutionRequest) -> MxfResult<ExecutionResponse> {
        let timeout = Duration::from_millis(request.timeout_ms);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| MxfError::SandboxFailure(format!("request encoding failed: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MxfError::SandboxFailure(format!("failed to spawn sandbox process: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MxfError::SandboxFailure("sandbox process has no stdin".to_string()))?;

        let run = async {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| MxfError::SandboxFailure(format!("failed to write to sandbox stdin: {e}")))?;
            drop(stdin);

            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| MxfError::SandboxFailure("sandbox process has no stdout".to_string()))?;
            let mut buf = Vec::new();
            stdout
                .read_to_end(&mut buf)
                .await
                .map_err(|e| MxfError::SandboxFailure(format!("failed to read sandbox stdout: {e}")))?;

            let status = child
                .wait()
                .await
                .map_err(|e| MxfError::SandboxFailure(format!("failed to wait on sandbox process: {e}")))?;

            serde_json::from_slice::<ExecutionResponse>(&buf).map_err(|e| {
                MxfError::SandboxFailure(format!(
                    "sandbox returned non-JSON output (exit {status}): {e}"
                ))
            })
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Ok(ExecutionResponse {
                success: false,
                output: serde_json::Value::Null,
                logs: Vec::new(),
                execution_time_ms: request.timeout_ms,
                error: Some("Execution timeout".to_string()),
                timeout: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: &str, timeout_ms: u64) -> ExecutionRequest {
        ExecutionRequest {
            code: code.to_string(),
            language: Language::Javascript,
            timeout_ms,
            context: ExecutionContext {
                agent_id: "a1".to_string(),
                channel_id: "c1".to_string(),
                request_id: "r1".to_string(),
            },
        }
    }

    /// Exercises the client against `sh`, which never produces the
    /// expected JSON response and so always surfaces as `SandboxFailure`
    /// — standing in for the real collaborator when no sandbox binary is
    /// available in this environment.
    #[tokio::test]
    async fn malformed_response_is_a_sandbox_failure() {
        let executor = SandboxExecutor::new("sh");
        let result = executor
            .execute(request("console.log(1)", 1_000))
            .await;
        assert!(matches!(result, Err(MxfError::SandboxFailure(_))));
    }

    /// A well-behaved collaborator that reads its stdin and writes a
    /// valid `ExecutionResponse` back should round-trip cleanly.
    #[tokio::test]
    async fn successful_execution_round_trips_through_a_real_process() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            script,
            "#!/bin/sh\ncat > /dev/null\necho '{{\"success\":true,\"output\":\"ok\",\"logs\":[],\"execution_time_ms\":5,\"error\":null,\"timeout\":false}}'"
        )
        .unwrap();
        let mut perms = script.as_file().metadata().unwrap().permissions();
        perms.set_mode(0o755);
        script.as_file().set_permissions(perms).unwrap();
        let path = script.path().to_str().unwrap().to_string();

        let executor = SandboxExecutor::new("sh").with_args(vec![path]);
        let response = executor.execute(request("console.log(1)", 1_000)).await.unwrap();

        assert!(response.success);
        assert!(!response.timeout);
        assert_eq!(response.output, serde_json::json!("ok"));
    }

    /// A process that never exits and never writes anything must still
    /// surface as a timeout response within the requested bound
    /// (spec §8 scenario 6).
    #[tokio::test]
    async fn hung_process_surfaces_as_timeout_response() {
        let executor = SandboxExecutor::new("sleep").with_args(vec!["5".to_string()]);
        let response = executor
            .execute(ExecutionRequest {
                code: "while(true){}".to_string(),
                language: Language::Javascript,
                timeout_ms: 100,
                context: ExecutionContext {
                    agent_id: "a1".to_string(),
                    channel_id: "c1".to_string(),
                    request_id: "r1".to_string(),
                },
            })
            .await
            .unwrap();

        assert!(response.timeout);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Execution timeout"));
    }
}
