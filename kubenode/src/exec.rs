use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::{
  error::{ExecutionError, FailureReason},
  utils,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Output of a command that eventually succeeded
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
  pub stdout: String,
  pub exit_status: i32,
  pub attempts_used: u32,
}

/// Applies changes to the host
///
/// Every package, service, kernel, file and cluster mutation goes through an implementation
/// of this trait so that retries, timeouts and logging are applied uniformly
#[async_trait]
pub trait Execute: Send + Sync {
  async fn run(&self, command: &str) -> Result<ExecutionResult, ExecutionError>;

  /// Replace the contents of `path` with `contents` and set its permission bits to `mode`
  ///
  /// Missing parent directories are created
  async fn write(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), ExecutionError>;
}

#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
  /// Upper bound on a single attempt
  pub timeout: Duration,
  /// Total number of attempts, including the first
  pub max_retries: u32,
  /// Fixed pause between attempts
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      timeout: DEFAULT_TIMEOUT,
      max_retries: DEFAULT_MAX_RETRIES,
      delay: DEFAULT_RETRY_DELAY,
    }
  }
}

/// Executes commands through `sh -c` with bounded retries and a per-attempt timeout
#[derive(Clone, Debug, Default)]
pub struct CommandRunner {
  policy: RetryPolicy,
}

enum Attempt {
  Success { stdout: String, status: i32 },
  Failed(FailureReason),
}

impl CommandRunner {
  pub fn new(policy: RetryPolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Run `command` with an explicit timeout and attempt budget
  ///
  /// Any failed attempt (timeout, launch error, non-zero exit) is retried until
  /// `max_retries` attempts have been made; the reason of the last attempt is reported
  pub async fn run_with(
    &self,
    command: &str,
    timeout: Duration,
    max_retries: u32,
  ) -> Result<ExecutionResult, ExecutionError> {
    validate(command)?;

    let max_retries = max_retries.max(1);
    let mut reason = FailureReason::Rejected;

    for attempt in 1..=max_retries {
      debug!("Executing ({attempt}/{max_retries}): {command}");

      match attempt_once(command, timeout).await {
        Attempt::Success { stdout, status } => {
          info!("Command succeeded: {command}");
          if !stdout.trim().is_empty() {
            debug!("{}", stdout.trim_end());
          }

          return Ok(ExecutionResult {
            stdout,
            exit_status: status,
            attempts_used: attempt,
          });
        }
        Attempt::Failed(failure) => {
          reason = failure;
          if attempt < max_retries {
            warn!("Retrying ({}/{max_retries}) after failure: {command} {reason}", attempt + 1);
            if !self.policy.delay.is_zero() {
              tokio::time::sleep(self.policy.delay).await;
            }
          }
        }
      }
    }

    error!("Command failed after {max_retries} attempts: {command}");
    Err(ExecutionError {
      command: command.to_owned(),
      reason,
      attempts: max_retries,
    })
  }
}

#[async_trait]
impl Execute for CommandRunner {
  async fn run(&self, command: &str) -> Result<ExecutionResult, ExecutionError> {
    self.run_with(command, self.policy.timeout, self.policy.max_retries).await
  }

  async fn write(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), ExecutionError> {
    let operation = format!("write {} (mode {mode:o})", path.display());
    let max_retries = self.policy.max_retries.max(1);
    let mut reason = FailureReason::Rejected;

    for attempt in 1..=max_retries {
      debug!("Executing ({attempt}/{max_retries}): {operation}");

      let (target, data) = (path.to_path_buf(), contents.to_vec());
      let task = tokio::task::spawn_blocking(move || utils::write_file(&data, &target, Some(mode)));

      reason = match tokio::time::timeout(self.policy.timeout, task).await {
        Ok(Ok(Ok(()))) => {
          info!("Wrote {} ({} bytes)", path.display(), contents.len());
          return Ok(());
        }
        Ok(Ok(Err(e))) => {
          error!("Unable to {operation}: {e}");
          FailureReason::SystemError(e.to_string())
        }
        Ok(Err(e)) => {
          error!("Unexpected error waiting on {operation}: {e}");
          FailureReason::SystemError(e.to_string())
        }
        Err(_) => {
          error!("Write timed out after {} seconds: {}", self.policy.timeout.as_secs_f32(), path.display());
          FailureReason::Timeout
        }
      };

      if attempt < max_retries {
        warn!("Retrying ({}/{max_retries}) after failure: {operation} {reason}", attempt + 1);
        if !self.policy.delay.is_zero() {
          tokio::time::sleep(self.policy.delay).await;
        }
      }
    }

    error!("Write failed after {max_retries} attempts: {}", path.display());
    Err(ExecutionError {
      command: operation,
      reason,
      attempts: max_retries,
    })
  }
}

/// Refuse commands that chain statements with `;`
///
/// Each call is meant to carry exactly one command; this catches accidental
/// concatenation and is not a security boundary
fn validate(command: &str) -> Result<(), ExecutionError> {
  if command.trim().is_empty() || command.contains(';') {
    return Err(ExecutionError {
      command: command.to_owned(),
      reason: FailureReason::Rejected,
      attempts: 0,
    });
  }

  Ok(())
}

async fn attempt_once(command: &str, timeout: Duration) -> Attempt {
  let child = Command::new("sh")
    .arg("-c")
    .arg(command)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn();

  let child = match child {
    Ok(child) => child,
    Err(e) => {
      error!("Unable to start command {command}: {e}");
      return Attempt::Failed(FailureReason::SystemError(e.to_string()));
    }
  };

  match tokio::time::timeout(timeout, child.wait_with_output()).await {
    Err(_) => {
      error!("Command timed out after {} seconds: {command}", timeout.as_secs_f32());
      Attempt::Failed(FailureReason::Timeout)
    }
    Ok(Err(e)) => {
      error!("Unexpected error waiting on command {command}: {e}");
      Attempt::Failed(FailureReason::SystemError(e.to_string()))
    }
    Ok(Ok(output)) => {
      let stdout = String::from_utf8_lossy(&output.stdout).to_string();
      if output.status.success() {
        Attempt::Success {
          stdout,
          status: output.status.code().unwrap_or(0),
        }
      } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {command}: {}", stderr.trim_end());
        Attempt::Failed(FailureReason::NonZeroExit(output.status.code()))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{fs, os::unix::fs::PermissionsExt};

  use tempfile::tempdir;

  use super::*;

  fn runner() -> CommandRunner {
    CommandRunner::new(RetryPolicy {
      timeout: Duration::from_secs(10),
      max_retries: 3,
      delay: Duration::ZERO,
    })
  }

  #[tokio::test]
  async fn it_captures_stdout() {
    let result = runner().run("echo hello").await.unwrap();

    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.exit_status, 0);
    assert_eq!(result.attempts_used, 1);
  }

  #[tokio::test]
  async fn it_succeeds_on_third_attempt() {
    let dir = tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let cmd = format!(
      "echo x >> {0} && test $(wc -l < {0}) -ge 3",
      counter.display()
    );

    let result = runner().run(&cmd).await.unwrap();

    assert_eq!(result.attempts_used, 3);
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);
  }

  #[tokio::test]
  async fn it_stops_after_max_retries_on_timeout() {
    let dir = tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let cmd = format!("echo x >> {} && sleep 5", counter.display());

    let err = runner()
      .run_with(&cmd, Duration::from_millis(200), 3)
      .await
      .unwrap_err();

    assert_eq!(err.reason, FailureReason::Timeout);
    assert_eq!(err.attempts, 3);
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);
  }

  #[tokio::test]
  async fn it_reports_final_exit_status() {
    let err = runner().run("exit 7").await.unwrap_err();

    assert_eq!(err.reason, FailureReason::NonZeroExit(Some(7)));
    assert_eq!(err.attempts, 3);
  }

  #[tokio::test]
  async fn it_rejects_statement_separators() {
    let err = runner().run("echo a; echo b").await.unwrap_err();

    assert_eq!(err.reason, FailureReason::Rejected);
    assert_eq!(err.attempts, 0);
  }

  #[tokio::test]
  async fn it_makes_at_least_one_attempt() {
    let result = runner().run_with("true", Duration::from_secs(5), 0).await.unwrap();
    assert_eq!(result.attempts_used, 1);
  }

  #[tokio::test]
  async fn it_writes_file_with_mode() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("etc/sysctl.d/k8s.conf");

    runner().write(&path, b"net.ipv4.ip_forward = 1\n", 0o600).await.unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "net.ipv4.ip_forward = 1\n");
    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
  }

  #[tokio::test]
  async fn it_retries_failed_write() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("etc");
    fs::write(&blocker, "not a directory").unwrap();

    let err = runner().write(&blocker.join("fstab"), b"", 0o644).await.unwrap_err();

    assert!(matches!(err.reason, FailureReason::SystemError(_)));
    assert_eq!(err.attempts, 3);
    assert!(err.command.starts_with("write "));
  }
}
