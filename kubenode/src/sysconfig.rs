use std::{fs, io};

use tracing::{debug, info};

use crate::{exec::Execute, Error, Layout, Result};

pub const FSTAB_PATH: &str = "/etc/fstab";
pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/k8s.conf";
pub const SYSCTL_PATH: &str = "/etc/sysctl.d/k8s.conf";

/// Kernel modules required for overlay filesystems and bridged pod traffic
pub const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];

/// Kernel parameters required for pod networking
pub const SYSCTL_PARAMS: [(&str, u8); 5] = [
  ("net.bridge.bridge-nf-call-iptables", 1),
  ("net.bridge.bridge-nf-call-ip6tables", 1),
  ("net.ipv4.ip_forward", 1),
  ("net.ipv4.conf.all.forwarding", 1),
  ("net.ipv6.conf.all.forwarding", 1),
];

/// Applies the kernel and network settings container networking depends on
///
/// Every step tolerates the already-applied state, so running it again is harmless
pub struct SystemConfigurator<'a> {
  runner: &'a dyn Execute,
  layout: &'a Layout,
}

impl<'a> SystemConfigurator<'a> {
  pub fn new(runner: &'a dyn Execute, layout: &'a Layout) -> Self {
    Self { runner, layout }
  }

  pub async fn apply(&self) -> Result<()> {
    self.disable_swap().await?;
    self.load_kernel_modules().await?;
    self.configure_sysctl().await?;

    info!("System configured");
    Ok(())
  }

  async fn disable_swap(&self) -> Result<()> {
    info!("Disabling swap");
    self.runner.run("swapoff -a").await?;

    let path = self.layout.host(FSTAB_PATH);
    let fstab = match fs::read_to_string(&path) {
      Ok(fstab) => fstab,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!("{} not found, nothing to persist", path.display());
        return Ok(());
      }
      Err(e) => return Err(Error::io("unable to read", &path, e)),
    };

    let updated = comment_swap_entries(&fstab);
    self.runner.write(&path, updated.as_bytes(), 0o644).await?;

    Ok(())
  }

  async fn load_kernel_modules(&self) -> Result<()> {
    let path = self.layout.host(MODULES_LOAD_PATH);
    let contents = format!("{}\n", KERNEL_MODULES.join("\n"));
    self.runner.write(&path, contents.as_bytes(), 0o644).await?;

    for module in KERNEL_MODULES {
      self.runner.run(&format!("modprobe {module}")).await?;
    }

    Ok(())
  }

  async fn configure_sysctl(&self) -> Result<()> {
    let path = self.layout.host(SYSCTL_PATH);
    self.runner.write(&path, sysctl_conf().as_bytes(), 0o644).await?;

    self.runner.run("sysctl --system").await?;
    Ok(())
  }
}

/// Render the sysctl drop-in file
pub fn sysctl_conf() -> String {
  SYSCTL_PARAMS
    .iter()
    .map(|(key, value)| format!("{key} = {value}\n"))
    .collect()
}

/// Comment out active swap entries of an fstab, leaving everything else untouched
pub fn comment_swap_entries(fstab: &str) -> String {
  let mut out: String = fstab
    .lines()
    .map(|line| {
      let trimmed = line.trim_start();
      let is_swap = !trimmed.starts_with('#') && trimmed.split_whitespace().nth(2) == Some("swap");
      match is_swap {
        true => format!("#{line}"),
        false => line.to_owned(),
      }
    })
    .collect::<Vec<_>>()
    .join("\n");

  if fstab.ends_with('\n') {
    out.push('\n');
  }
  out
}
