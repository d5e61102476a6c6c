use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Broad classification of a failure, used to decide how far a run got before aborting
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// Missing or invalid settings; raised before the host is touched
  Configuration,
  /// Host does not meet the minimum requirements; raised before the host is touched
  Prerequisite,
  /// Distribution or network plugin is not one of the supported values
  UnsupportedPlatform,
  /// A command failed after exhausting its retries
  Execution,
  /// An artifact could not be written to disk
  Persistence,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Configuration => write!(f, "configuration"),
      Self::Prerequisite => write!(f, "prerequisite"),
      Self::UnsupportedPlatform => write!(f, "unsupported platform"),
      Self::Execution => write!(f, "execution"),
      Self::Persistence => write!(f, "persistence"),
    }
  }
}

/// Why the final attempt of a command failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
  /// The command did not finish within its timeout
  Timeout,
  /// The command exited with a non-zero status (or was killed by a signal)
  NonZeroExit(Option<i32>),
  /// The command could not be launched or the file could not be written
  SystemError(String),
  /// The command was refused before any attempt was made
  Rejected,
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Timeout => write!(f, "timed out"),
      Self::NonZeroExit(Some(code)) => write!(f, "exited with status {code}"),
      Self::NonZeroExit(None) => write!(f, "terminated by signal"),
      Self::SystemError(msg) => write!(f, "failed with a system error: {msg}"),
      Self::Rejected => write!(f, "contains a statement separator"),
    }
  }
}

#[derive(Clone, Debug, Error)]
#[error("command `{command}` {reason} (attempts: {attempts})")]
pub struct ExecutionError {
  pub command: String,
  pub reason: FailureReason,
  pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("unable to read configuration file {path}: {source}")]
  ConfigRead { path: PathBuf, source: io::Error },

  #[error("unable to parse configuration file {path}: {source}")]
  ConfigParse { path: PathBuf, source: serde_yaml::Error },

  #[error("missing required configuration fields: {}", .0.join(", "))]
  MissingConfig(Vec<&'static str>),

  #[error("invalid CIDR: {0}")]
  InvalidCidr(String),

  #[error("invalid Kubernetes version: {0}")]
  InvalidVersion(String),

  #[error("unable to detect Linux distribution: {0}")]
  DistroDetection(String),

  #[error("insufficient {resource}: {available} < {required}")]
  InsufficientResources {
    resource: &'static str,
    required: String,
    available: String,
  },

  #[error("port {port} is already in use")]
  PortInUse { port: u16 },

  #[error("unable to determine whether port {port} is in use: {source}")]
  PortProbe { port: u16, source: io::Error },

  #[error("must be run as root (effective uid {0})")]
  NotRoot(u32),

  #[error("required commands not found on PATH: {}", .0.join(", "))]
  MissingCommands(Vec<String>),

  #[error("unsupported distribution: {0}")]
  UnsupportedDistro(String),

  #[error("unsupported network plugin: {0}")]
  UnsupportedPlugin(String),

  #[error("worker role requires --join-command")]
  MissingJoinCommand,

  #[error(transparent)]
  Execution(#[from] ExecutionError),

  #[error("{context} {path}: {source}")]
  Io {
    context: &'static str,
    path: PathBuf,
    source: io::Error,
  },

  #[error("unable to write {path}: {source}")]
  Persistence { path: PathBuf, source: io::Error },

  #[error("unable to render {what}: {reason}")]
  Render { what: &'static str, reason: String },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::ConfigRead { .. }
      | Self::ConfigParse { .. }
      | Self::MissingConfig(_)
      | Self::InvalidCidr(_)
      | Self::InvalidVersion(_)
      | Self::MissingJoinCommand => ErrorKind::Configuration,
      Self::DistroDetection(_)
      | Self::InsufficientResources { .. }
      | Self::PortInUse { .. }
      | Self::PortProbe { .. }
      | Self::NotRoot(_)
      | Self::MissingCommands(_) => ErrorKind::Prerequisite,
      Self::UnsupportedDistro(_) | Self::UnsupportedPlugin(_) => ErrorKind::UnsupportedPlatform,
      Self::Execution(_) | Self::Io { .. } | Self::Render { .. } => ErrorKind::Execution,
      Self::Persistence { .. } => ErrorKind::Persistence,
    }
  }

  /// Shorthand for wrapping a filesystem error with the path it concerns
  pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
    Self::Io {
      context,
      path: path.into(),
      source,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
