use std::{
  collections::HashMap,
  fs,
  net::{IpAddr, Ipv4Addr, UdpSocket},
  path::Path,
};

use nix::unistd::Uid;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

use crate::{Error, Result};

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Snapshot of the host taken once at start up
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostFacts {
  /// os-release `ID`, lower-cased
  pub distro_id: String,
  /// os-release `ID_LIKE`, lower-cased
  pub distro_like: Vec<String>,
  pub distro_version: String,
  pub architecture: String,
  pub cpu_count: usize,
  pub memory_bytes: u64,
  pub kernel_version: String,
  pub hostname: String,
  pub primary_ip: IpAddr,
  pub effective_uid: u32,
}

impl HostFacts {
  pub fn capture() -> Result<Self> {
    Self::capture_from(OS_RELEASE_PATH)
  }

  pub fn capture_from<P: AsRef<Path>>(os_release: P) -> Result<Self> {
    let os_release = os_release.as_ref();
    let contents = fs::read_to_string(os_release)
      .map_err(|e| Error::DistroDetection(format!("{}: {e}", os_release.display())))?;
    let release = parse_os_release(&contents);

    let distro_id = release
      .get("ID")
      .map(|id| id.to_lowercase())
      .ok_or_else(|| Error::DistroDetection(format!("{} does not define ID", os_release.display())))?;

    let mut sys = System::new();
    sys.refresh_memory();

    let facts = HostFacts {
      distro_id,
      distro_like: release
        .get("ID_LIKE")
        .map(|like| like.split_whitespace().map(str::to_lowercase).collect())
        .unwrap_or_default(),
      distro_version: release.get("VERSION_ID").cloned().unwrap_or_default(),
      architecture: std::env::consts::ARCH.to_string(),
      cpu_count: num_cpus::get(),
      memory_bytes: sys.total_memory(),
      kernel_version: System::kernel_version().unwrap_or_default(),
      hostname: dns_lookup::get_hostname().unwrap_or_default(),
      primary_ip: primary_ip(),
      effective_uid: Uid::effective().as_raw(),
    };
    debug!("Host facts: {facts:#?}");

    Ok(facts)
  }
}

/// Parse `KEY=value` lines, stripping surrounding quotes
pub fn parse_os_release(contents: &str) -> HashMap<String, String> {
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .filter_map(|line| line.split_once('='))
    .map(|(key, value)| {
      let value = value.trim().trim_matches('"').trim_matches('\'');
      (key.trim().to_owned(), value.to_owned())
    })
    .collect()
}

/// Address of the interface used for outbound traffic
///
/// Connecting a UDP socket selects a route without sending anything.
/// Any failure yields the loopback address
pub fn primary_ip() -> IpAddr {
  let probe = || -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
  };

  probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  const UBUNTU: &str = r#"PRETTY_NAME="Ubuntu 22.04.3 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION="22.04.3 LTS (Jammy Jellyfish)"
ID=ubuntu
ID_LIKE=debian
HOME_URL="https://www.ubuntu.com/"
"#;

  #[test]
  fn it_parses_os_release() {
    let release = parse_os_release(UBUNTU);

    assert_eq!(release["ID"], "ubuntu");
    assert_eq!(release["ID_LIKE"], "debian");
    assert_eq!(release["VERSION_ID"], "22.04");
    assert_eq!(release["PRETTY_NAME"], "Ubuntu 22.04.3 LTS");
  }

  #[test]
  fn it_captures_facts() {
    let mut file = NamedTempFile::new().unwrap();
    file
      .write_all(b"NAME=\"Rocky Linux\"\nID=\"Rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.3\"\n")
      .unwrap();

    let facts = HostFacts::capture_from(file.path()).unwrap();

    assert_eq!(facts.distro_id, "rocky");
    assert_eq!(facts.distro_like, vec!["rhel", "centos", "fedora"]);
    assert_eq!(facts.distro_version, "9.3");
    assert!(facts.cpu_count >= 1);
    assert!(facts.memory_bytes > 0);
  }

  #[test]
  fn it_fails_without_os_release() {
    let err = HostFacts::capture_from("/nonexistent/os-release").unwrap_err();
    assert!(matches!(err, Error::DistroDetection(_)));
  }

  #[test]
  fn it_fails_without_id() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"NAME=\"Mystery\"\n").unwrap();

    assert!(matches!(
      HostFacts::capture_from(file.path()),
      Err(Error::DistroDetection(_))
    ));
  }
}
