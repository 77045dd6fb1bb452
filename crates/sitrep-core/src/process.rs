//! Child-process execution for external scanning tools.
//!
//! One wrapper enforces timeout, stdout/stderr capture, optional stdin, and
//! byte-safe decoding (some tools emit latin-1). The child is spawned with
//! kill-on-drop, so a timeout or a cancelled activity reaps it.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Captured output of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `command` (first element is the executable) and capture its output.
///
/// `input` is written to the child's stdin when provided. A zero `timeout`
/// disables the deadline.
pub async fn run_command(
    command: &[String],
    timeout: Duration,
    input: Option<&str>,
) -> Result<CommandOutput> {
    let exe = command
        .first()
        .ok_or_else(|| Error::BadInput("empty command".into()))?;
    let args = &command[1..];

    debug!(exe = %exe, args = ?args, "spawning external tool");

    let mut child = Command::new(exe)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::EnumerationTool(format!("failed to spawn {exe}: {e}")))?;

    if let Some(data) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data.as_bytes()).await?;
            stdin.shutdown().await?;
        }
    }

    let wait = child.wait_with_output();
    let output = if timeout.is_zero() {
        wait.await?
    } else {
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            Error::EnumerationTool(format!(
                "{exe} timed out after {} seconds",
                timeout.as_secs()
            ))
        })??
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Split tool output on newlines and return the sorted unique set.
pub fn unique_lines(outputs: &[&str]) -> Vec<String> {
    let mut set: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for output in outputs {
        set.extend(
            output
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_simple_command() {
        let command = vec!["echo".to_string(), "hello".to_string()];
        let output = run_command(&command, Duration::from_secs(10), None)
            .await
            .expect("echo should run");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_reports_exit_code() {
        let command = vec!["false".to_string()];
        let output = run_command(&command, Duration::from_secs(10), None)
            .await
            .expect("false should run");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let command = vec!["cat".to_string()];
        let output = run_command(&command, Duration::from_secs(10), Some("a.example.com\n"))
            .await
            .expect("cat should run");
        assert_eq!(output.stdout, "a.example.com\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let command = vec!["sleep".to_string(), "30".to_string()];
        let err = run_command(&command, Duration::from_millis(100), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "EnumerationToolError");
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let command = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let err = run_command(&command, Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "EnumerationToolError");
    }

    #[test]
    fn test_unique_lines_merges_and_sorts() {
        let merged = unique_lines(&["b.example.com\na.example.com\n", "a.example.com\nc.example.com"]);
        assert_eq!(
            merged,
            vec!["a.example.com", "b.example.com", "c.example.com"]
        );
    }

    #[test]
    fn test_unique_lines_drops_blanks() {
        assert!(unique_lines(&["\n\n  \n"]).is_empty());
    }
}
