use std::{
  io,
  net::{Ipv4Addr, SocketAddr},
  time::Duration,
};

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::{host::HostFacts, Error, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Ports used by the API server, etcd, kubelet, controller-manager and scheduler
pub const CONTROL_PLANE_PORTS: [u16; 6] = [6443, 2379, 2380, 10250, 10257, 10259];

/// Tooling that must be on `PATH` before the cluster can be initialized or joined
pub const REQUIRED_COMMANDS: [&str; 2] = ["kubeadm", "kubectl"];

/// Validates that the host can become a cluster node before anything is changed
#[derive(Clone, Debug)]
pub struct PrerequisiteChecker {
  pub min_memory_bytes: u64,
  pub min_cpus: usize,
  pub ports: Vec<u16>,
  pub probe_timeout: Duration,
}

impl Default for PrerequisiteChecker {
  fn default() -> Self {
    Self {
      min_memory_bytes: 2 * GIB,
      min_cpus: 2,
      ports: CONTROL_PLANE_PORTS.to_vec(),
      probe_timeout: Duration::from_secs(2),
    }
  }
}

impl PrerequisiteChecker {
  pub async fn check(&self, facts: &HostFacts) -> Result<()> {
    if facts.effective_uid != 0 {
      return Err(Error::NotRoot(facts.effective_uid));
    }

    if facts.memory_bytes < self.min_memory_bytes {
      return Err(Error::InsufficientResources {
        resource: "memory",
        required: format!("{:.1}GiB", self.min_memory_bytes as f64 / GIB as f64),
        available: format!("{:.1}GiB", facts.memory_bytes as f64 / GIB as f64),
      });
    }

    if facts.cpu_count < self.min_cpus {
      return Err(Error::InsufficientResources {
        resource: "CPU cores",
        required: self.min_cpus.to_string(),
        available: facts.cpu_count.to_string(),
      });
    }

    for port in &self.ports {
      self.check_port(*port).await?;
    }

    info!("Prerequisites satisfied");
    Ok(())
  }

  /// Fail if something already accepts TCP connections on the local port
  ///
  /// A refused connection means the port is free; any other probe error is reported
  pub async fn check_port(&self, port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
      Ok(Ok(_)) => Err(Error::PortInUse { port }),
      Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
        debug!("Port {port} is free");
        Ok(())
      }
      Ok(Err(source)) => Err(Error::PortProbe { port, source }),
      Err(_) => Err(Error::PortProbe {
        port,
        source: io::Error::new(io::ErrorKind::TimedOut, "connection attempt timed out"),
      }),
    }
  }
}

/// Fail unless every command can be resolved on `PATH`
pub fn check_commands(commands: &[&str]) -> Result<()> {
  let missing: Vec<String> = commands
    .iter()
    .filter(|cmd| which::which(cmd).is_err())
    .map(|cmd| cmd.to_string())
    .collect();

  match missing.is_empty() {
    true => Ok(()),
    false => Err(Error::MissingCommands(missing)),
  }
}
