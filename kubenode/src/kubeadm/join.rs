use std::{fmt, io, path::Path, sync::OnceLock};

use regex_lite::Regex;

use crate::{exec::Execute, Error, Result};

pub const JOIN_COMMAND_FILE: &str = "join-command.sh";

/// `kubeadm join` line followed directly by its indented CA hash continuation line
const INIT_PATTERN: &str = r"kubeadm join .+\n[ \t]+--discovery-token-ca-cert-hash (\S+)";
const PRINT_PATTERN: &str = r"kubeadm join \S+ .*--discovery-token-ca-cert-hash (\S+)";

type Compiled = OnceLock<std::result::Result<Regex, regex_lite::Error>>;

static INIT_REGEX: Compiled = OnceLock::new();
static PRINT_REGEX: Compiled = OnceLock::new();

fn compiled(cell: &'static Compiled, pattern: &str) -> Result<&'static Regex> {
  cell
    .get_or_init(|| Regex::new(pattern))
    .as_ref()
    .map_err(|e| Error::Render {
      what: "join command pattern",
      reason: e.to_string(),
    })
}

/// The credential-bearing invocation a worker runs once to join the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinCommand {
  command: String,
  ca_cert_hash: String,
}

impl JoinCommand {
  /// Extract the worker join command from `kubeadm init` output
  ///
  /// kubeadm prints a `kubeadm join ... --token ...` line followed by an indented
  /// `--discovery-token-ca-cert-hash` line. The control plane variant is printed first,
  /// so the last occurrence is the worker command. `None` when no such fragment exists
  pub fn from_init_output(output: &str) -> Result<Option<Self>> {
    let re = compiled(&INIT_REGEX, INIT_PATTERN)?;

    Ok(re.captures_iter(output).last().and_then(|cap| {
      Some(JoinCommand {
        command: cap.get(0)?.as_str().to_owned(),
        ca_cert_hash: cap.get(1)?.as_str().to_owned(),
      })
    }))
  }

  /// Parse the single line printed by `kubeadm token create --print-join-command`
  pub fn from_print_output(output: &str) -> Result<Option<Self>> {
    let re = compiled(&PRINT_REGEX, PRINT_PATTERN)?;

    Ok(re.captures(output).and_then(|cap| {
      Some(JoinCommand {
        command: cap.get(0)?.as_str().trim_end().to_owned(),
        ca_cert_hash: cap.get(1)?.as_str().to_owned(),
      })
    }))
  }

  pub fn command(&self) -> &str {
    &self.command
  }

  pub fn ca_cert_hash(&self) -> &str {
    &self.ca_cert_hash
  }

  /// Persist the command readable and writable by the owner only
  pub async fn write(&self, runner: &dyn Execute, path: &Path) -> Result<()> {
    runner
      .write(path, self.command.as_bytes(), 0o600)
      .await
      .map_err(|e| Error::Persistence {
        path: path.to_path_buf(),
        source: io::Error::other(e),
      })
  }
}

impl fmt::Display for JoinCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.command)
  }
}
