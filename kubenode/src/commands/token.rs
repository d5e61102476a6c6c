use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{bootstrap::join_command_path, exec::Execute, kubeadm::JoinCommand, Layout};

#[derive(Args, Debug, Serialize, Deserialize)]
pub struct Token {
  /// Directory the join command is written to
  #[arg(long, default_value = ".")]
  pub work_dir: PathBuf,
}

impl Token {
  pub fn layout(&self) -> Layout {
    Layout::new(&self.work_dir)
  }

  /// Request a fresh bootstrap token from the control plane and persist the join command
  pub async fn create(&self, runner: &dyn Execute, layout: &Layout) -> Result<JoinCommand> {
    let output = runner
      .run(&format!(
        "kubeadm token create --print-join-command --kubeconfig {}",
        layout.kubeconfig.display()
      ))
      .await?;
    let join = JoinCommand::from_print_output(&output.stdout)?
      .ok_or_else(|| anyhow!("kubeadm did not print a join command"))?;

    let path = join_command_path(layout);
    join.write(runner, &path).await?;
    info!("Join command written to {}", path.display());

    Ok(join)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;
  use crate::testing::FakeRunner;

  #[tokio::test]
  async fn it_persists_new_join_command() {
    let dir = tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let runner = FakeRunner::default().respond(
      "kubeadm token create",
      "kubeadm join 10.0.0.5:6443 --token fresh.token --discovery-token-ca-cert-hash sha256:cafe \n",
    );
    let token = Token {
      work_dir: layout.work_dir.to_owned(),
    };

    let join = token.create(&runner, &layout).await.unwrap();

    assert_eq!(join.ca_cert_hash(), "sha256:cafe");
    assert_eq!(runner.writes(), vec![(join_command_path(&layout), 0o600)]);
    assert_eq!(
      fs::read_to_string(join_command_path(&layout)).unwrap(),
      "kubeadm join 10.0.0.5:6443 --token fresh.token --discovery-token-ca-cert-hash sha256:cafe"
    );
  }

  #[tokio::test]
  async fn it_fails_without_join_command() {
    let dir = tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let runner = FakeRunner::default().respond("kubeadm token create", "error: cluster unreachable\n");
    let token = Token {
      work_dir: layout.work_dir.to_owned(),
    };

    assert!(token.create(&runner, &layout).await.is_err());
    assert!(!join_command_path(&layout).exists());
  }
}
