use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  distro::DEFAULT_CHANNEL,
  kubeadm::{validate_cidr, NetworkPlugin},
  utils, Error, Result,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const DEFAULT_SERVICE_CIDR: &str = "10.96.0.0/12";

/// Cluster settings for a control plane bootstrap, loaded once per run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisioningConfig {
  pub pod_network_cidr: String,
  pub service_cidr: String,
  pub network_plugin: String,
  pub kubernetes_version: Option<String>,
  pub enable_monitoring: bool,
  pub enable_logging: bool,
}

/// The file as written, before required fields are enforced
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
  pod_network_cidr: Option<String>,
  service_cidr: Option<String>,
  network_plugin: Option<String>,
  kubernetes_version: Option<String>,
  enable_monitoring: Option<bool>,
  enable_logging: Option<bool>,
}

impl ProvisioningConfig {
  /// Read and validate the configuration file at `path`
  ///
  /// A missing file is an error; no defaults are substituted for required fields
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let config = Self::from_raw(read_raw(path.as_ref())?)?;
    config.validate()?;
    Ok(config)
  }

  fn from_raw(raw: RawConfig) -> Result<Self> {
    let missing: Vec<&'static str> = [
      ("pod_network_cidr", raw.pod_network_cidr.is_none()),
      ("network_plugin", raw.network_plugin.is_none()),
    ]
    .into_iter()
    .filter_map(|(field, absent)| absent.then_some(field))
    .collect();

    match (raw.pod_network_cidr, raw.network_plugin) {
      (Some(pod_network_cidr), Some(network_plugin)) => Ok(Self {
        pod_network_cidr,
        service_cidr: raw.service_cidr.unwrap_or_else(|| DEFAULT_SERVICE_CIDR.to_string()),
        network_plugin,
        kubernetes_version: raw.kubernetes_version,
        enable_monitoring: raw.enable_monitoring.unwrap_or(false),
        enable_logging: raw.enable_logging.unwrap_or(false),
      }),
      _ => Err(Error::MissingConfig(missing)),
    }
  }

  /// Check every value that would otherwise only fail part way through a run
  pub fn validate(&self) -> Result<()> {
    validate_cidr(&self.pod_network_cidr)?;
    validate_cidr(&self.service_cidr)?;
    self.plugin()?;
    self.version()?;

    Ok(())
  }

  pub fn plugin(&self) -> Result<NetworkPlugin> {
    self.network_plugin.parse()
  }

  /// The pinned Kubernetes version in the `vX.Y.Z` form kubeadm expects
  pub fn version(&self) -> Result<Option<String>> {
    self.kubernetes_version.as_deref().map(normalize_version).transpose()
  }

  /// Package repository channel (`v<major>.<minor>`) for the pinned version
  pub fn channel(&self) -> Result<String> {
    channel_for(self.kubernetes_version.as_deref())
  }
}

/// Read only `kubernetes_version` from the configuration file at `path`
///
/// Workers share the master's file to stay on the same tooling version, but the
/// cluster settings it requires are not needed to join
pub fn load_kubernetes_version<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
  read_raw(path.as_ref())?
    .kubernetes_version
    .as_deref()
    .map(normalize_version)
    .transpose()
}

/// Validate `version` and return it in the `vX.Y.Z` form
pub fn normalize_version(version: &str) -> Result<String> {
  utils::get_semver(version)?;
  let version = version.trim();
  Ok(format!("v{}", version.strip_prefix('v').unwrap_or(version)))
}

/// Package repository channel (`v<major>.<minor>`) for `version`, or the default channel when unpinned
pub fn channel_for(version: Option<&str>) -> Result<String> {
  match version {
    Some(ver) => {
      let ver = utils::get_semver(ver)?;
      Ok(format!("v{}.{}", ver.major, ver.minor))
    }
    None => Ok(DEFAULT_CHANNEL.to_string()),
  }
}

fn read_raw(path: &Path) -> Result<RawConfig> {
  debug!("Loading configuration from {}", path.display());

  let contents = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
    path: path.to_path_buf(),
    source,
  })?;
  let raw: Option<RawConfig> = serde_yaml::from_str(&contents).map_err(|source| Error::ConfigParse {
    path: path.to_path_buf(),
    source,
  })?;

  Ok(raw.unwrap_or_default())
}
