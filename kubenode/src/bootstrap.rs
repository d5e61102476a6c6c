use std::{fmt, fs};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
  config::{self, ProvisioningConfig},
  containerd::ContainerRuntimeInstaller,
  distro::DistroProfile,
  exec::Execute,
  host::HostFacts,
  kubeadm::{
    backup_cluster_config, validate_cidr, Addon, ClusterConfiguration, InitDescriptor, JoinCommand,
    ADMIN_CONF_PATH, INIT_CONFIG_FILE, JOIN_COMMAND_FILE,
  },
  prereq::{self, PrerequisiteChecker, REQUIRED_COMMANDS},
  sysconfig::SystemConfigurator,
  Error, Layout, Result, Role,
};

/// Progress of a bootstrap run; each stage is only reached once the previous one completed
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  NotStarted,
  PrerequisitesChecked,
  SystemConfigured,
  RuntimeInstalled,
  MasterInitialized,
  WorkerJoined,
  Done,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NotStarted => write!(f, "not started"),
      Self::PrerequisitesChecked => write!(f, "prerequisites checked"),
      Self::SystemConfigured => write!(f, "system configured"),
      Self::RuntimeInstalled => write!(f, "runtime installed"),
      Self::MasterInitialized => write!(f, "master initialized"),
      Self::WorkerJoined => write!(f, "worker joined"),
      Self::Done => write!(f, "done"),
    }
  }
}

/// What the run should turn this host into
#[derive(Clone, Debug)]
pub enum Plan {
  /// Initialize a control plane from the provisioning configuration
  Master(ProvisioningConfig),
  /// Join an existing cluster by running the join command verbatim
  ///
  /// `kubernetes_version` selects the package channel the worker tooling is installed from
  Worker {
    join_command: Option<String>,
    kubernetes_version: Option<String>,
  },
}

impl Plan {
  pub fn role(&self) -> Role {
    match self {
      Self::Master(_) => Role::Master,
      Self::Worker { .. } => Role::Worker,
    }
  }

  /// Validate the plan before anything on the host is inspected or changed
  pub fn preflight(&self) -> Result<()> {
    match self {
      Self::Master(config) => config.validate(),
      Self::Worker {
        join_command,
        kubernetes_version,
      } => {
        match join_command.as_deref().map(str::trim) {
          Some(cmd) if !cmd.is_empty() => (),
          _ => return Err(Error::MissingJoinCommand),
        }
        kubernetes_version.as_deref().map(config::normalize_version).transpose()?;
        Ok(())
      }
    }
  }

  /// Package repository channel the cluster tooling is installed from
  pub fn channel(&self) -> Result<String> {
    match self {
      Self::Master(config) => config.channel(),
      Self::Worker { kubernetes_version, .. } => config::channel_for(kubernetes_version.as_deref()),
    }
  }
}

/// A problem that was logged and recovered from without aborting the run
#[derive(Debug)]
pub enum Warning {
  /// `kubeadm init` output did not contain a worker join command
  JoinCommandNotFound,
  /// An optional add-on could not be installed
  AddonFailed { addon: Addon, error: Error },
  /// An artifact (join command, configuration backup) could not be written
  Persistence(Error),
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::JoinCommandNotFound => write!(
        f,
        "join command not found in init output; run `kubeadm token create --print-join-command`"
      ),
      Self::AddonFailed { addon, error } => write!(f, "{addon} add-on failed: {error}"),
      Self::Persistence(error) => write!(f, "{error}"),
    }
  }
}

/// Outcome of a completed run
#[derive(Debug)]
pub struct Report {
  pub stage: Stage,
  pub join_command: Option<JoinCommand>,
  pub warnings: Vec<Warning>,
}

/// Drives a host through the provisioning stages in order
///
/// There is no rollback; a failed run is recovered by running again from the top
pub struct ClusterBootstrapper<'a> {
  runner: &'a dyn Execute,
  layout: &'a Layout,
  checker: PrerequisiteChecker,
  required_commands: Vec<&'static str>,
  stage: Stage,
  warnings: Vec<Warning>,
}

impl<'a> ClusterBootstrapper<'a> {
  pub fn new(runner: &'a dyn Execute, layout: &'a Layout) -> Self {
    Self {
      runner,
      layout,
      checker: PrerequisiteChecker::default(),
      required_commands: REQUIRED_COMMANDS.to_vec(),
      stage: Stage::NotStarted,
      warnings: Vec::new(),
    }
  }

  pub fn with_checker(mut self, checker: PrerequisiteChecker) -> Self {
    self.checker = checker;
    self
  }

  /// Commands that must resolve on `PATH` once cluster tooling is installed
  pub fn with_required_commands(mut self, commands: &[&'static str]) -> Self {
    self.required_commands = commands.to_vec();
    self
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub async fn run(&mut self, plan: &Plan, facts: &HostFacts) -> Result<Report> {
    info!("Bootstrapping {} node {}", plan.role(), facts.hostname);

    match self.pipeline(plan, facts).await {
      Ok(join_command) => {
        self.stage = Stage::Done;
        for warning in &self.warnings {
          warn!("{warning}");
        }
        info!("Bootstrap complete");

        Ok(Report {
          stage: self.stage,
          join_command,
          warnings: std::mem::take(&mut self.warnings),
        })
      }
      Err(err) => {
        error!("Bootstrap failed after stage '{}' ({} error): {err}", self.stage, err.kind());
        Err(err)
      }
    }
  }

  async fn pipeline(&mut self, plan: &Plan, facts: &HostFacts) -> Result<Option<JoinCommand>> {
    plan.preflight()?;

    self.checker.check(facts).await?;
    self.stage = Stage::PrerequisitesChecked;

    let profile = DistroProfile::detect(facts, &plan.channel()?)?;
    info!("Detected {} ({})", profile.distro, facts.distro_version);

    SystemConfigurator::new(self.runner, self.layout).apply().await?;
    self.stage = Stage::SystemConfigured;

    self.install_runtime(&profile).await?;
    self.stage = Stage::RuntimeInstalled;

    match plan {
      Plan::Master(config) => {
        let join_command = self.initialize_master(config, facts).await?;
        self.stage = Stage::MasterInitialized;

        self.install_addons(config).await;
        Ok(join_command)
      }
      Plan::Worker { join_command, .. } => {
        self.join_worker(join_command.as_deref()).await?;
        self.stage = Stage::WorkerJoined;
        Ok(None)
      }
    }
  }

  async fn install_runtime(&self, profile: &DistroProfile) -> Result<()> {
    profile.setup_repository(self.runner, self.layout).await?;
    profile.install_cluster_tools(self.runner).await?;
    ContainerRuntimeInstaller::new(self.runner, self.layout)
      .install(profile)
      .await?;

    prereq::check_commands(&self.required_commands)
  }

  /// Initialize the control plane and return the worker join command, if one was printed
  async fn initialize_master(&mut self, config: &ProvisioningConfig, facts: &HostFacts) -> Result<Option<JoinCommand>> {
    let pod_subnet = validate_cidr(&config.pod_network_cidr)?;
    let service_subnet = validate_cidr(&config.service_cidr)?;
    let plugin = config.plugin()?;

    if let Err(e) = backup_cluster_config(self.runner, self.layout, Utc::now()).await {
      self.warnings.push(Warning::Persistence(e));
    }

    let version = config.version()?;
    let cluster = ClusterConfiguration::new(&pod_subnet, &service_subnet, version.as_deref());
    let descriptor_path = self.layout.artifact(INIT_CONFIG_FILE);
    InitDescriptor::new(cluster, facts.primary_ip)
      .write(self.runner, &descriptor_path)
      .await?;

    info!("Initializing control plane");
    let init = self
      .runner
      .run(&format!("kubeadm init --config {}", descriptor_path.display()))
      .await?;

    self.copy_admin_credentials().await?;
    plugin.deploy(self.runner, self.layout).await?;

    match JoinCommand::from_init_output(&init.stdout)? {
      Some(join) => {
        let path = join_command_path(self.layout);
        match join.write(self.runner, &path).await {
          Ok(()) => info!("Join command written to {}", path.display()),
          Err(e) => self.warnings.push(Warning::Persistence(e)),
        }
        Ok(Some(join))
      }
      None => {
        self.warnings.push(Warning::JoinCommandNotFound);
        Ok(None)
      }
    }
  }

  async fn copy_admin_credentials(&self) -> Result<()> {
    let source = self.layout.host(ADMIN_CONF_PATH);
    let admin = fs::read(&source).map_err(|e| Error::io("unable to read", &source, e))?;

    let dest = &self.layout.kubeconfig;
    self.runner.write(dest, &admin, 0o600).await?;
    info!("Admin credentials copied to {}", dest.display());

    Ok(())
  }

  async fn install_addons(&mut self, config: &ProvisioningConfig) {
    let addons = [
      (config.enable_monitoring, Addon::Monitoring),
      (config.enable_logging, Addon::Logging),
    ];

    for (_, addon) in addons.into_iter().filter(|(enabled, _)| *enabled) {
      if let Err(error) = addon.install(self.runner, self.layout).await {
        self.warnings.push(Warning::AddonFailed { addon, error });
      }
    }
  }

  async fn join_worker(&self, join_command: Option<&str>) -> Result<()> {
    let command = join_command
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .ok_or(Error::MissingJoinCommand)?;

    info!("Joining cluster");
    self.runner.run(command).await?;
    Ok(())
  }
}

/// Default location of the join command written by a master run
pub fn join_command_path(layout: &Layout) -> std::path::PathBuf {
  layout.artifact(JOIN_COMMAND_FILE)
}
