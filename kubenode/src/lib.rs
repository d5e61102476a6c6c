pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod containerd;
pub mod distro;
pub mod error;
pub mod exec;
pub mod host;
pub mod kubeadm;
pub mod prereq;
pub mod sysconfig;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::{
  env, fmt,
  path::{Path, PathBuf},
};

use clap::ValueEnum;
pub use cli::{Cli, Commands};
pub use error::{Error, ErrorKind, ExecutionError, FailureReason, Result};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

/// Embeds the contents of the `templates/` directory into the binary
///
/// Templates use `{{NAME}}` placeholders which are replaced at render time
#[derive(RustEmbed)]
#[folder = "templates/"]
pub struct Templates;

/// Render an embedded template, replacing each `{{KEY}}` with its value
pub fn render_template(name: &'static str, vars: &[(&str, &str)]) -> Result<String> {
  let file = Templates::get(name).ok_or(Error::Render {
    what: name,
    reason: "template not found".to_string(),
  })?;
  let tmpl = std::str::from_utf8(file.data.as_ref()).map_err(|e| Error::Render {
    what: name,
    reason: e.to_string(),
  })?;

  Ok(
    vars
      .iter()
      .fold(tmpl.to_owned(), |acc, (key, value)| acc.replace(&format!("{{{{{key}}}}}"), value)),
  )
}

/// The role this host plays in the cluster
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Role {
  /// Initialize a new control plane on this host
  Master,
  /// Join this host to an existing control plane
  Worker,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Master => write!(f, "master"),
      Self::Worker => write!(f, "worker"),
    }
  }
}

/// Where files are read from and written to during a run
#[derive(Clone, Debug)]
pub struct Layout {
  /// Root that host configuration paths (e.g. `/etc/sysctl.d`) are resolved beneath
  pub root: PathBuf,
  /// Directory for per-run artifacts: init descriptor, plugin manifest, join command
  pub work_dir: PathBuf,
  /// Destination of the admin credentials copied after control plane init
  pub kubeconfig: PathBuf,
  /// Parent directory of timestamped configuration backups
  pub backup_root: PathBuf,
}

impl Layout {
  pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
    let home = env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/root"));

    Self {
      root: PathBuf::from("/"),
      work_dir: work_dir.into(),
      kubeconfig: home.join(".kube").join("config"),
      backup_root: PathBuf::from("/opt"),
    }
  }

  /// Layout rooted somewhere other than `/`, used to stage a host filesystem
  pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
    let root = root.as_ref();

    Self {
      root: root.to_path_buf(),
      work_dir: root.join("work"),
      kubeconfig: root.join("root/.kube/config"),
      backup_root: root.join("opt"),
    }
  }

  /// Resolve an absolute host path beneath the layout root
  pub fn host<P: AsRef<Path>>(&self, path: P) -> PathBuf {
    let path = path.as_ref();
    self.root.join(path.strip_prefix("/").unwrap_or(path))
  }

  pub fn artifact<P: AsRef<Path>>(&self, name: P) -> PathBuf {
    self.work_dir.join(name)
  }
}

impl Default for Layout {
  fn default() -> Self {
    Self::new(".")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_resolves_host_paths() {
    let layout = Layout::rooted("/tmp/stage");
    assert_eq!(
      layout.host("/etc/sysctl.d/k8s.conf"),
      PathBuf::from("/tmp/stage/etc/sysctl.d/k8s.conf")
    );

    let layout = Layout::default();
    assert_eq!(layout.host("/etc/fstab"), PathBuf::from("/etc/fstab"));
  }

  #[test]
  fn it_renders_templates() {
    let rendered = render_template("kubernetes.repo", &[("CHANNEL", "v1.30")]).unwrap();
    assert!(rendered.contains("baseurl=https://pkgs.k8s.io/core:/stable:/v1.30/rpm/"));
    assert!(!rendered.contains("{{"));
  }

  #[test]
  fn it_fails_on_unknown_template() {
    assert!(matches!(
      render_template("missing.tmpl", &[]),
      Err(Error::Render { .. })
    ));
  }
}
