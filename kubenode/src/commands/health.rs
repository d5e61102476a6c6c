use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{exec::Execute, Layout};

#[derive(Args, Debug, Default, Serialize, Deserialize)]
pub struct Health {
  /// Kubeconfig used to reach the cluster; defaults to $HOME/.kube/config
  #[arg(long)]
  pub kubeconfig: Option<PathBuf>,
}

impl Health {
  pub fn layout(&self) -> Layout {
    let mut layout = Layout::default();
    if let Some(kubeconfig) = &self.kubeconfig {
      layout.kubeconfig = kubeconfig.to_owned();
    }
    layout
  }

  /// Fetch node and pod status, failing if the API server cannot be reached
  pub async fn report(&self, runner: &dyn Execute, layout: &Layout) -> Result<String> {
    let mut report = String::new();
    for query in ["get nodes -o wide", "get pods --all-namespaces"] {
      let output = runner
        .run(&format!("kubectl --kubeconfig {} {query}", layout.kubeconfig.display()))
        .await?;
      report.push_str(&output.stdout);
    }

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{testing::FakeRunner, FailureReason};

  #[tokio::test]
  async fn it_queries_nodes_and_pods() {
    let health = Health {
      kubeconfig: Some(PathBuf::from("/etc/kubernetes/admin.conf")),
    };
    let runner = FakeRunner::default()
      .respond("kubectl --kubeconfig /etc/kubernetes/admin.conf get nodes", "node-1   Ready\n")
      .respond("kubectl --kubeconfig /etc/kubernetes/admin.conf get pods", "coredns   Running\n");

    let report = health.report(&runner, &health.layout()).await.unwrap();

    assert_eq!(report, "node-1   Ready\ncoredns   Running\n");
  }

  #[tokio::test]
  async fn it_fails_when_cluster_is_unreachable() {
    let health = Health::default();
    let runner = FakeRunner::default().fail("kubectl", FailureReason::NonZeroExit(Some(1)));

    assert!(health.report(&runner, &health.layout()).await.is_err());
    assert_eq!(runner.commands().len(), 1);
  }
}
