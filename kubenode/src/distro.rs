use std::fmt;

use tracing::{debug, info, warn};

use crate::{exec::Execute, host::HostFacts, render_template, Error, Layout, Result};

pub const APT_KEYRING_PATH: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";
pub const APT_SOURCE_PATH: &str = "/etc/apt/sources.list.d/kubernetes.list";
pub const RPM_REPO_PATH: &str = "/etc/yum.repos.d/kubernetes.repo";

/// Package repository channel used when no Kubernetes version is pinned
pub const DEFAULT_CHANNEL: &str = "v1.29";

/// Package manager verbs for a distribution family
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PackageCommands {
  pub update: &'static str,
  pub install: &'static str,
  pub remove: &'static str,
  pub clean: &'static str,
}

const APT: PackageCommands = PackageCommands {
  update: "apt-get update",
  install: "apt-get install -y",
  remove: "apt-get remove -y",
  clean: "apt-get clean",
};

// `check-update` exits 100 when updates are available, so indexes are refreshed with `makecache`
const DNF: PackageCommands = PackageCommands {
  update: "dnf makecache",
  install: "dnf install -y",
  remove: "dnf remove -y",
  clean: "dnf clean all",
};

const YUM: PackageCommands = PackageCommands {
  update: "yum makecache",
  install: "yum install -y",
  remove: "yum remove -y",
  clean: "yum clean all",
};

const ZYPPER: PackageCommands = PackageCommands {
  update: "zypper refresh",
  install: "zypper install -y",
  remove: "zypper remove -y",
  clean: "zypper clean",
};

const PACMAN: PackageCommands = PackageCommands {
  update: "pacman -Sy",
  install: "pacman -S --noconfirm",
  remove: "pacman -R --noconfirm",
  clean: "pacman -Sc --noconfirm",
};

/// How the cluster tooling package repository is added on a distribution
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RepositorySetup {
  /// Keyring plus an apt source list
  Apt,
  /// Imported key plus a rendered `.repo` file
  Rpm,
  /// No dedicated procedure; tooling is expected to be installed already
  None,
}

/// Linux distribution families, keyed by the os-release `ID`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Distro {
  Ubuntu,
  Debian,
  Fedora,
  CentOs,
  Rhel,
  Suse,
  Arch,
  Unsupported(String),
}

impl Distro {
  /// Map an os-release identifier onto a family, case-insensitively
  pub fn from_id(id: &str) -> Self {
    let id = id.trim().to_lowercase();
    match id.as_str() {
      "ubuntu" => Self::Ubuntu,
      "debian" => Self::Debian,
      "fedora" => Self::Fedora,
      "centos" => Self::CentOs,
      "rhel" => Self::Rhel,
      "suse" => Self::Suse,
      "arch" => Self::Arch,
      _ => Self::Unsupported(id),
    }
  }

  /// Determine the family of the host, falling back to `ID_LIKE` entries when `ID` is unknown
  pub fn detect(facts: &HostFacts) -> Self {
    let distro = Self::from_id(&facts.distro_id);
    if distro.is_supported() {
      return distro;
    }

    match facts
      .distro_like
      .iter()
      .map(|id| Self::from_id(id))
      .find(Self::is_supported)
    {
      Some(like) => {
        debug!("Treating {} as {like} based on ID_LIKE", facts.distro_id);
        like
      }
      None => distro,
    }
  }

  pub fn is_supported(&self) -> bool {
    !matches!(self, Self::Unsupported(_))
  }

  pub fn commands(&self) -> Result<PackageCommands> {
    match self {
      Self::Ubuntu | Self::Debian => Ok(APT),
      Self::Fedora => Ok(DNF),
      Self::CentOs | Self::Rhel => Ok(YUM),
      Self::Suse => Ok(ZYPPER),
      Self::Arch => Ok(PACMAN),
      Self::Unsupported(id) => Err(Error::UnsupportedDistro(id.to_owned())),
    }
  }

  pub fn repository(&self) -> Result<RepositorySetup> {
    match self {
      Self::Ubuntu | Self::Debian => Ok(RepositorySetup::Apt),
      Self::Fedora | Self::CentOs | Self::Rhel => Ok(RepositorySetup::Rpm),
      Self::Suse | Self::Arch => Ok(RepositorySetup::None),
      Self::Unsupported(id) => Err(Error::UnsupportedDistro(id.to_owned())),
    }
  }

  /// Name of the container runtime package in the family's repositories
  pub fn container_runtime_package(&self) -> Result<&'static str> {
    match self {
      Self::Ubuntu | Self::Debian => Ok("containerd.io"),
      Self::Fedora | Self::CentOs | Self::Rhel | Self::Suse | Self::Arch => Ok("containerd"),
      Self::Unsupported(id) => Err(Error::UnsupportedDistro(id.to_owned())),
    }
  }
}

impl fmt::Display for Distro {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Ubuntu => write!(f, "ubuntu"),
      Self::Debian => write!(f, "debian"),
      Self::Fedora => write!(f, "fedora"),
      Self::CentOs => write!(f, "centos"),
      Self::Rhel => write!(f, "rhel"),
      Self::Suse => write!(f, "suse"),
      Self::Arch => write!(f, "arch"),
      Self::Unsupported(id) => write!(f, "{id}"),
    }
  }
}

/// Look up the package manager verbs for an os-release identifier
pub fn resolve(distro_id: &str) -> Result<PackageCommands> {
  Distro::from_id(distro_id).commands()
}

/// A supported distribution together with its package manager verbs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistroProfile {
  pub distro: Distro,
  pub commands: PackageCommands,
  /// Package repository channel, e.g. `v1.29`
  pub channel: String,
}

impl DistroProfile {
  pub fn new(distro: Distro, channel: &str) -> Result<Self> {
    let commands = distro.commands()?;

    Ok(Self {
      distro,
      commands,
      channel: channel.to_owned(),
    })
  }

  pub fn detect(facts: &HostFacts, channel: &str) -> Result<Self> {
    match Distro::detect(facts) {
      Distro::Unsupported(_) => Err(Error::UnsupportedDistro(facts.distro_id.to_owned())),
      distro => Self::new(distro, channel),
    }
  }

  pub fn install_command(&self, packages: &[&str]) -> String {
    format!("{} {}", self.commands.install, packages.join(" "))
  }

  /// Add the cluster tooling package repository and refresh package indexes
  ///
  /// Families without a dedicated procedure are left untouched
  pub async fn setup_repository(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    match self.distro.repository()? {
      RepositorySetup::Apt => self.setup_apt_repository(runner, layout).await?,
      RepositorySetup::Rpm => self.setup_rpm_repository(runner, layout).await?,
      RepositorySetup::None => {
        warn!(
          "No package repository procedure for {}; cluster tooling must already be installed",
          self.distro
        );
        return Ok(());
      }
    }

    runner.run(self.commands.update).await?;
    Ok(())
  }

  async fn setup_apt_repository(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    info!("Adding Kubernetes {} apt repository", self.channel);
    runner
      .run(&self.install_command(&["apt-transport-https", "ca-certificates", "curl", "gpg"]))
      .await?;

    let keyring = layout.host(APT_KEYRING_PATH);
    runner
      .run(&format!("mkdir -p -m 755 {}", layout.host("/etc/apt/keyrings").display()))
      .await?;
    runner
      .run(&format!(
        "curl -fsSL https://pkgs.k8s.io/core:/stable:/{}/deb/Release.key | gpg --dearmor --batch --yes -o {}",
        self.channel,
        keyring.display()
      ))
      .await?;

    let source = render_template(
      "kubernetes.list",
      &[("CHANNEL", &self.channel), ("KEYRING", APT_KEYRING_PATH)],
    )?;
    runner.write(&layout.host(APT_SOURCE_PATH), source.as_bytes(), 0o644).await?;
    Ok(())
  }

  async fn setup_rpm_repository(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    info!("Adding Kubernetes {} rpm repository", self.channel);
    runner
      .run(&format!(
        "rpm --import https://pkgs.k8s.io/core:/stable:/{}/rpm/repodata/repomd.xml.key",
        self.channel
      ))
      .await?;

    let repo = render_template("kubernetes.repo", &[("CHANNEL", &self.channel)])?;
    runner.write(&layout.host(RPM_REPO_PATH), repo.as_bytes(), 0o644).await?;
    Ok(())
  }

  /// Install kubelet, kubeadm and kubectl from the repository added by `setup_repository`
  ///
  /// Returns `false` when the family has no repository procedure and nothing was installed
  pub async fn install_cluster_tools(&self, runner: &dyn Execute) -> Result<bool> {
    if self.distro.repository()? == RepositorySetup::None {
      return Ok(false);
    }

    info!("Installing kubelet, kubeadm and kubectl");
    runner.run(&self.install_command(&["kubelet", "kubeadm", "kubectl"])).await?;
    runner.run("systemctl enable kubelet").await?;

    Ok(true)
  }
}
