use std::{
  io,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{exec::Execute, Error, ExecutionError, Layout, Result};

/// Directory holding the control plane configuration kubeadm generates
pub const KUBERNETES_DIR: &str = "/etc/kubernetes";

/// Name of the backup directory for a run started at `at`
pub fn backup_name(at: DateTime<Utc>) -> String {
  format!("k8s_backup_{}", at.format("%Y%m%d_%H%M%S"))
}

/// Copy an existing `/etc/kubernetes` beneath `layout.backup_root`
///
/// Returns the backup location, or `None` when there is nothing to back up.
/// Failures are reported as `Error::Persistence`
pub async fn backup_cluster_config(runner: &dyn Execute, layout: &Layout, at: DateTime<Utc>) -> Result<Option<PathBuf>> {
  let source = layout.host(KUBERNETES_DIR);
  if !source.is_dir() {
    debug!("{} does not exist, skipping backup", source.display());
    return Ok(None);
  }

  let dest = layout.backup_root.join(backup_name(at));
  let persistence = |path: &Path| {
    let path = path.to_path_buf();
    move |e: ExecutionError| Error::Persistence {
      path,
      source: io::Error::other(e),
    }
  };

  runner
    .run(&format!("mkdir -p {}", layout.backup_root.display()))
    .await
    .map_err(persistence(&layout.backup_root))?;
  runner
    .run(&format!("cp -a {} {}", source.display(), dest.display()))
    .await
    .map_err(persistence(&dest))?;

  info!("Backed up {} to {}", source.display(), dest.display());
  Ok(Some(dest))
}
