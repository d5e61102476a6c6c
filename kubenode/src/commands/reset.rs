use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{exec::Execute, kubeadm::backup_cluster_config, Layout};

#[derive(Args, Debug, Default, Serialize, Deserialize)]
pub struct Reset {}

impl Reset {
  /// Back up `/etc/kubernetes`, undo `kubeadm init`/`join` and remove the admin kubeconfig
  pub async fn reset(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    if let Err(e) = backup_cluster_config(runner, layout, Utc::now()).await {
      warn!("{e}");
    }

    runner.run("kubeadm reset -f").await?;

    runner.run(&format!("rm -f {}", layout.kubeconfig.display())).await?;
    info!("Removed {}", layout.kubeconfig.display());

    Ok(())
  }
}
