use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  bootstrap::{ClusterBootstrapper, Plan},
  config::{self, ProvisioningConfig, DEFAULT_CONFIG_PATH},
  distro::DEFAULT_CHANNEL,
  exec::Execute,
  host::HostFacts,
  Layout, Role,
};

#[derive(Args, Debug, Serialize, Deserialize)]
pub struct Bootstrap {
  /// The role this host plays in the cluster
  #[arg(long, value_enum)]
  pub role: Role,

  /// Provisioning configuration file [default: config.yml]
  ///
  /// Required for the master role. A worker reads only `kubernetes_version` from it,
  /// and skips the default file when it does not exist
  #[arg(long)]
  pub config: Option<PathBuf>,

  /// Kubernetes version to install tooling for, overriding the configuration file
  #[arg(long)]
  pub kubernetes_version: Option<String>,

  /// Join command printed by the control plane, required for the worker role
  ///
  /// Executed verbatim; obtain it from the master's join-command.sh or `kubenode token`
  #[arg(long)]
  pub join_command: Option<String>,

  /// Directory where the init descriptor, network plugin manifest and join command are written
  #[arg(long, default_value = ".")]
  pub work_dir: PathBuf,
}

impl Bootstrap {
  /// Build and validate the plan for the requested role
  pub fn plan(&self) -> crate::Result<Plan> {
    let plan = match self.role {
      Role::Master => {
        let path = self.config.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
        let mut config = ProvisioningConfig::load(path)?;
        if let Some(version) = &self.kubernetes_version {
          config.kubernetes_version = Some(version.to_owned());
        }
        Plan::Master(config)
      }
      Role::Worker => Plan::Worker {
        join_command: self.join_command.to_owned(),
        kubernetes_version: self.worker_version()?,
      },
    };
    plan.preflight()?;

    Ok(plan)
  }

  fn worker_version(&self) -> crate::Result<Option<String>> {
    if let Some(version) = &self.kubernetes_version {
      if let Some(path) = &self.config {
        warn!("--kubernetes-version overrides the version in {}", path.display());
      }
      return Ok(Some(version.to_owned()));
    }

    let version = match &self.config {
      Some(path) => config::load_kubernetes_version(path)?,
      None if Path::new(DEFAULT_CONFIG_PATH).exists() => config::load_kubernetes_version(DEFAULT_CONFIG_PATH)?,
      None => None,
    };
    if version.is_none() {
      warn!("No Kubernetes version pinned for this worker; installing tooling from the {DEFAULT_CHANNEL} channel");
    }

    Ok(version)
  }

  pub async fn bootstrap(&self, runner: &dyn Execute) -> Result<()> {
    let plan = self.plan()?;
    let facts = HostFacts::capture()?;
    let layout = Layout::new(&self.work_dir);

    let report = ClusterBootstrapper::new(runner, &layout)
      .run(&plan, &facts)
      .await
      .with_context(|| format!("{} bootstrap failed", self.role))?;

    if report.join_command.is_some() {
      info!(
        "Workers can join with the command saved in {}",
        crate::bootstrap::join_command_path(&layout).display()
      );
    }
    if !report.warnings.is_empty() {
      warn!("Completed with {} warning(s)", report.warnings.len());
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;
  use crate::{
    prereq::PrerequisiteChecker,
    testing::{facts, FakeRunner},
    Error, Layout,
  };

  fn args(role: Role, config: Option<PathBuf>, join_command: Option<&str>) -> Bootstrap {
    Bootstrap {
      role,
      config,
      kubernetes_version: None,
      join_command: join_command.map(str::to_owned),
      work_dir: PathBuf::from("."),
    }
  }

  #[test]
  fn it_reads_only_version_for_worker() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "kubernetes_version: v1.31.1\n").unwrap();

    match args(Role::Worker, Some(path), Some("kubeadm join x")).plan().unwrap() {
      Plan::Worker { kubernetes_version, .. } => assert_eq!(kubernetes_version.as_deref(), Some("v1.31.1")),
      plan => panic!("unexpected plan {plan:?}"),
    }
  }

  #[test]
  fn it_prefers_version_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "kubernetes_version: v1.31.1\n").unwrap();
    let mut worker = args(Role::Worker, Some(path), Some("kubeadm join x"));
    worker.kubernetes_version = Some("1.30.4".to_string());

    assert_eq!(worker.plan().unwrap().channel().unwrap(), "v1.30");
  }

  #[test]
  fn it_fails_on_missing_worker_config() {
    let dir = tempdir().unwrap();
    let err = args(Role::Worker, Some(dir.path().join("absent.yml")), Some("kubeadm join x"))
      .plan()
      .unwrap_err();

    assert!(matches!(err, Error::ConfigRead { .. }));
  }

  #[tokio::test]
  async fn it_installs_worker_tooling_from_pinned_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "pod_network_cidr: 10.244.0.0/16\nnetwork_plugin: calico\nkubernetes_version: v1.31.0\n").unwrap();
    let plan = args(Role::Worker, Some(path), Some("kubeadm join 10.0.0.5:6443 --token abc.def"))
      .plan()
      .unwrap();
    let layout = Layout::rooted(dir.path());
    let runner = FakeRunner::default();

    ClusterBootstrapper::new(&runner, &layout)
      .with_checker(PrerequisiteChecker {
        ports: vec![],
        ..PrerequisiteChecker::default()
      })
      .with_required_commands(&[])
      .run(&plan, &facts())
      .await
      .unwrap();

    assert!(runner.ran("curl -fsSL https://pkgs.k8s.io/core:/stable:/v1.31/deb/Release.key"));
  }

  #[test]
  fn it_loads_config_for_master() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "pod_network_cidr: 10.244.0.0/16\nnetwork_plugin: cilium\n").unwrap();

    match args(Role::Master, Some(path), None).plan().unwrap() {
      Plan::Master(config) => assert_eq!(config.network_plugin, "cilium"),
      plan => panic!("unexpected plan {plan:?}"),
    }
  }

  #[test]
  fn it_rejects_worker_without_join_command() {
    let err = args(Role::Worker, None, None).plan().unwrap_err();
    assert!(matches!(err, Error::MissingJoinCommand));
  }
}
