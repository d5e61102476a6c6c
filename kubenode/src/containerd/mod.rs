use tracing::{debug, info, warn};

use crate::{distro::DistroProfile, exec::Execute, Error, Layout, Result};

pub const CONFIG_PATH: &str = "/etc/containerd/config.toml";

const CGROUP_KEY: &str = "SystemdCgroup";

/// Result of rewriting the runc cgroup driver flag
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CgroupDriver {
  /// `SystemdCgroup = false` was flipped to `true`
  Enabled,
  /// The generated configuration already used the systemd driver
  AlreadyEnabled,
  /// No runc options table with the flag was found
  NotFound,
}

/// Installs containerd and configures it to use the systemd cgroup driver
pub struct ContainerRuntimeInstaller<'a> {
  runner: &'a dyn Execute,
  layout: &'a Layout,
}

impl<'a> ContainerRuntimeInstaller<'a> {
  pub fn new(runner: &'a dyn Execute, layout: &'a Layout) -> Self {
    Self { runner, layout }
  }

  pub async fn install(&self, profile: &DistroProfile) -> Result<()> {
    let package = profile.distro.container_runtime_package()?;
    info!("Installing container runtime package {package}");
    self.runner.run(&profile.install_command(&[package])).await?;

    let default = self.runner.run("containerd config default").await?;
    let (config, driver) = enable_systemd_cgroup(&default.stdout);
    match driver {
      CgroupDriver::Enabled => debug!("Enabled {CGROUP_KEY} for runc"),
      CgroupDriver::AlreadyEnabled => debug!("{CGROUP_KEY} already enabled for runc"),
      CgroupDriver::NotFound => warn!("No runc {CGROUP_KEY} setting found in generated containerd configuration"),
    }

    toml::from_str::<toml::Value>(&config).map_err(|e| Error::Render {
      what: "containerd configuration",
      reason: e.to_string(),
    })?;

    let path = self.layout.host(CONFIG_PATH);
    self.runner.write(&path, config.as_bytes(), 0o644).await?;

    self.runner.run("systemctl restart containerd").await?;
    self.runner.run("systemctl enable containerd").await?;

    info!("Container runtime installed");
    Ok(())
  }
}

/// Flip `SystemdCgroup = false` to `true` inside the runc options table
///
/// Only that one line is touched; every other generated setting is preserved verbatim.
/// Both the v2 (`io.containerd.grpc.v1.cri`) and v3 (`io.containerd.cri.v1.runtime`)
/// layouts end the table name in `runtimes.runc.options`
pub fn enable_systemd_cgroup(config: &str) -> (String, CgroupDriver) {
  let mut in_runc_options = false;
  let mut driver = CgroupDriver::NotFound;

  let mut out: String = config
    .lines()
    .map(|line| {
      let trimmed = line.trim();
      if trimmed.starts_with('[') {
        in_runc_options = trimmed.ends_with("runtimes.runc.options]");
        return line.to_owned();
      }

      if !in_runc_options {
        return line.to_owned();
      }

      match trimmed.split_once('=').map(|(k, v)| (k.trim(), v.trim())) {
        Some((CGROUP_KEY, "false")) => {
          driver = CgroupDriver::Enabled;
          line.replacen("false", "true", 1)
        }
        Some((CGROUP_KEY, "true")) => {
          if driver == CgroupDriver::NotFound {
            driver = CgroupDriver::AlreadyEnabled;
          }
          line.to_owned()
        }
        _ => line.to_owned(),
      }
    })
    .collect::<Vec<_>>()
    .join("\n");

  if config.ends_with('\n') {
    out.push('\n');
  }

  (out, driver)
}
