// SPDX-License-Identifier: MIT
//! External command execution and systemd service control.
//!
//! Everything the subsystem shells out for goes through [`run_command`], so
//! callers get a uniform outcome record (exit code, captured output, elapsed
//! time) that maps directly onto the gateway's response envelope.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{KioskError, Result};
use crate::retry::{retry_fixed, RetryConfig};

/// Bound on any single external command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// The systemd unit that wraps the kiosk browser session.
pub const KIOSK_SERVICE: &str = "kiosk-browser.service";

/// Captured result of one external command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    /// Exit code, or -1 when the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl CommandOutcome {
    /// Combined output for log lines and error strings.
    pub fn output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Run `program args...`, capturing output. A timeout or spawn failure maps
/// to [`KioskError::External`]; a non-zero exit is a normal outcome the
/// caller inspects.
pub async fn run_command(program: &str, args: &[&str]) -> Result<CommandOutcome> {
    let started = Instant::now();
    let run = Command::new(program).args(args).output();
    let output = tokio::time::timeout(COMMAND_TIMEOUT, run)
        .await
        .map_err(|_| {
            KioskError::External(format!(
                "{program} timed out after {}s",
                COMMAND_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| KioskError::External(format!("failed to run {program}: {e}")))?;

    let outcome = CommandOutcome {
        success: output.status.success(),
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    if !outcome.success {
        warn!(
            program,
            code = outcome.code,
            stderr = %outcome.stderr,
            "command exited non-zero"
        );
    }
    Ok(outcome)
}

/// `systemctl <verb> <unit>`. Service control is idempotent, so failures
/// get a bounded fixed-delay retry.
pub async fn systemctl(verb: &str, unit: &str, retry: &RetryConfig) -> Result<CommandOutcome> {
    info!(verb, unit, "systemctl");
    retry_fixed(retry, || async {
        let outcome = run_command("systemctl", &[verb, unit]).await?;
        if outcome.success {
            Ok(outcome)
        } else {
            Err(KioskError::External(format!(
                "systemctl {verb} {unit} exited {}: {}",
                outcome.code,
                outcome.output()
            )))
        }
    })
    .await
}

/// One-shot status query; non-zero exit just means inactive, so no retry.
pub async fn service_status(unit: &str) -> Result<CommandOutcome> {
    run_command("systemctl", &["status", unit, "--no-pager", "-l"]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let outcome = run_command("sh", &["-c", "echo hello"]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.stdout, "hello");
        assert!(outcome.stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_normal_outcome() {
        let outcome = run_command("sh", &["-c", "echo oops >&2; exit 3"])
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, 3);
        assert_eq!(outcome.stderr, "oops");
    }

    #[tokio::test]
    async fn missing_binary_is_external_error() {
        let err = run_command("definitely-not-a-real-binary-7f3a", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::External(_)));
    }

    #[test]
    fn combined_output_prefers_both_streams() {
        let outcome = CommandOutcome {
            success: false,
            code: 1,
            stdout: "out".into(),
            stderr: "err".into(),
            elapsed_ms: 0,
        };
        assert_eq!(outcome.output(), "out\nerr");
    }
}
