//! External program execution shared by the updater, installer, and task runner.

use crate::error::StepError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

const TAIL_LINES: usize = 8;

pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Render an argv for log lines.
pub fn describe(argv: &[String]) -> String {
    argv.join(" ")
}

/// Last `TAIL_LINES` non-empty lines of `text`.
pub fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join(" | ")
}

fn build(argv: &[String], cwd: &Path) -> Result<Command, StepError> {
    let (program, args) = argv.split_first().ok_or_else(|| StepError::Command {
        command: String::new(),
        status: "not started".into(),
        detail: "empty command line".into(),
    })?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd).kill_on_drop(true);
    Ok(cmd)
}

fn spawn_error(argv: &[String], e: std::io::Error) -> StepError {
    StepError::Command {
        command: describe(argv),
        status: "not started".into(),
        detail: e.to_string(),
    }
}

/// Run to completion, capturing stdout/stderr.
pub async fn output(argv: &[String], cwd: &Path) -> Result<CommandOutput, StepError> {
    let out = build(argv, cwd)?
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(argv, e))?;
    Ok(CommandOutput {
        status: out.status,
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

/// Run to completion with inherited stdio.
pub async fn status(argv: &[String], cwd: &Path) -> Result<ExitStatus, StepError> {
    build(argv, cwd)?
        .status()
        .await
        .map_err(|e| spawn_error(argv, e))
}

/// Run and turn a non-zero exit into a `StepError`.
pub async fn checked_output(argv: &[String], cwd: &Path) -> Result<CommandOutput, StepError> {
    let out = output(argv, cwd).await?;
    if out.success() {
        Ok(out)
    } else {
        let detail = match tail(&out.stderr) {
            t if t.is_empty() => tail(&out.stdout),
            t => t,
        };
        Err(StepError::Command {
            command: describe(argv),
            status: out.status.to_string(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=20).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert_eq!(tail(&text), "13 | 14 | 15 | 16 | 17 | 18 | 19 | 20");
        assert_eq!(tail("\n\n"), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = std::env::temp_dir();
        let ok = checked_output(&argv(&["sh", "-c", "echo hi"]), &dir).await.unwrap();
        assert_eq!(ok.stdout.trim(), "hi");

        let err = checked_output(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), &dir)
            .await
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{msg}");
        assert!(msg.contains('3'), "{msg}");
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let err = output(&argv(&["definitely-not-a-real-program-xyz"]), &std::env::temp_dir())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("not started"));
    }
}
