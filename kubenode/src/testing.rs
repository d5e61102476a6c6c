use std::{
  net::IpAddr,
  path::{Path, PathBuf},
  sync::Mutex,
};

use async_trait::async_trait;

use crate::{
  exec::{Execute, ExecutionResult},
  host::HostFacts,
  utils, ExecutionError, FailureReason,
};

/// Host facts for a machine that satisfies every prerequisite
pub fn facts() -> HostFacts {
  HostFacts {
    distro_id: "ubuntu".to_string(),
    distro_like: vec!["debian".to_string()],
    distro_version: "22.04".to_string(),
    architecture: "x86_64".to_string(),
    cpu_count: 4,
    memory_bytes: 8 * 1024 * 1024 * 1024,
    kernel_version: "6.5.0-generic".to_string(),
    hostname: "node-1".to_string(),
    primary_ip: IpAddr::from([10, 0, 0, 5]),
    effective_uid: 0,
  }
}

enum Scripted {
  Output(String),
  Failure(FailureReason),
}

/// Records commands instead of running them
///
/// Commands starting with a scripted prefix return the scripted output or failure;
/// everything else succeeds with empty output. Writes are recorded and then applied,
/// so tests rooted in a temporary directory can inspect the result
#[derive(Default)]
pub struct FakeRunner {
  commands: Mutex<Vec<String>>,
  writes: Mutex<Vec<(PathBuf, u32)>>,
  scripts: Vec<(String, Scripted)>,
}

impl FakeRunner {
  pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
    self.scripts.push((prefix.to_owned(), Scripted::Output(stdout.to_owned())));
    self
  }

  pub fn fail(mut self, prefix: &str, reason: FailureReason) -> Self {
    self.scripts.push((prefix.to_owned(), Scripted::Failure(reason)));
    self
  }

  pub fn commands(&self) -> Vec<String> {
    self.commands.lock().unwrap().clone()
  }

  pub fn ran(&self, prefix: &str) -> bool {
    self.commands().iter().any(|c| c.starts_with(prefix))
  }

  /// Paths written through the runner, with their modes, in order
  pub fn writes(&self) -> Vec<(PathBuf, u32)> {
    self.writes.lock().unwrap().clone()
  }

  pub fn wrote(&self, path: &Path) -> bool {
    self.writes().iter().any(|(p, _)| p == path)
  }
}

#[async_trait]
impl Execute for FakeRunner {
  async fn run(&self, command: &str) -> Result<ExecutionResult, ExecutionError> {
    self.commands.lock().unwrap().push(command.to_owned());

    match self.scripts.iter().find(|(prefix, _)| command.starts_with(prefix.as_str())) {
      Some((_, Scripted::Output(stdout))) => Ok(ExecutionResult {
        stdout: stdout.to_owned(),
        exit_status: 0,
        attempts_used: 1,
      }),
      Some((_, Scripted::Failure(reason))) => Err(ExecutionError {
        command: command.to_owned(),
        reason: reason.clone(),
        attempts: 3,
      }),
      None => Ok(ExecutionResult::default()),
    }
  }

  async fn write(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), ExecutionError> {
    self.writes.lock().unwrap().push((path.to_path_buf(), mode));

    utils::write_file(contents, path, Some(mode)).map_err(|e| ExecutionError {
      command: format!("write {}", path.display()),
      reason: FailureReason::SystemError(e.to_string()),
      attempts: 1,
    })
  }
}
