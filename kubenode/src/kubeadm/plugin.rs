use std::{fmt, str::FromStr};

use tracing::info;

use crate::{exec::Execute, Error, Layout, Result};

/// Pod network add-ons that can be deployed after the control plane is initialized
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NetworkPlugin {
  Calico,
  Cilium,
  Flannel,
}

impl NetworkPlugin {
  pub const ALL: [NetworkPlugin; 3] = [Self::Calico, Self::Cilium, Self::Flannel];

  pub fn manifest_url(&self) -> &'static str {
    match self {
      Self::Calico => "https://raw.githubusercontent.com/projectcalico/calico/v3.27.0/manifests/calico.yaml",
      Self::Cilium => "https://raw.githubusercontent.com/cilium/cilium/v1.14/install/kubernetes/quick-install.yaml",
      Self::Flannel => "https://raw.githubusercontent.com/flannel-io/flannel/master/Documentation/kube-flannel.yml",
    }
  }

  /// File name the fetched manifest is saved under in the work directory
  pub fn manifest_file(&self) -> String {
    format!("{self}-manifest.yaml")
  }

  /// Adjust the fetched manifest before it is applied
  ///
  /// Manifests are applied as published; this is where per-cluster edits belong
  pub fn customize(&self, manifest: String) -> String {
    manifest
  }

  /// Fetch, save and apply the plugin manifest against the cluster in `layout.kubeconfig`
  pub async fn deploy(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    info!("Deploying {self} network plugin");
    let fetched = runner.run(&format!("curl -fsSL {}", self.manifest_url())).await?;
    let manifest = self.customize(fetched.stdout);

    let path = layout.artifact(self.manifest_file());
    runner.write(&path, manifest.as_bytes(), 0o644).await?;

    runner
      .run(&format!(
        "kubectl --kubeconfig {} apply -f {}",
        layout.kubeconfig.display(),
        path.display()
      ))
      .await?;

    Ok(())
  }
}

impl FromStr for NetworkPlugin {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "calico" => Ok(Self::Calico),
      "cilium" => Ok(Self::Cilium),
      "flannel" => Ok(Self::Flannel),
      _ => Err(Error::UnsupportedPlugin(s.to_owned())),
    }
  }
}

impl fmt::Display for NetworkPlugin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Calico => write!(f, "calico"),
      Self::Cilium => write!(f, "cilium"),
      Self::Flannel => write!(f, "flannel"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use rstest::*;
  use tempfile::tempdir;

  use super::*;
  use crate::{testing::FakeRunner, FailureReason};

  #[rstest]
  #[case("calico", NetworkPlugin::Calico)]
  #[case("Cilium", NetworkPlugin::Cilium)]
  #[case("FLANNEL", NetworkPlugin::Flannel)]
  fn it_parses_plugin_names(#[case] name: &str, #[case] expected: NetworkPlugin) {
    assert_eq!(name.parse::<NetworkPlugin>().unwrap(), expected);
  }

  #[test]
  fn it_rejects_unknown_plugins() {
    let err = "weave".parse::<NetworkPlugin>().unwrap_err();
    assert!(matches!(err, Error::UnsupportedPlugin(name) if name == "weave"));
  }

  #[test]
  fn it_has_a_manifest_for_every_plugin() {
    for plugin in NetworkPlugin::ALL {
      assert!(plugin.manifest_url().starts_with("https://"));
      assert_eq!(plugin.to_string().parse::<NetworkPlugin>().unwrap(), plugin);
    }
  }

  #[tokio::test]
  async fn it_deploys_plugin() {
    let dir = tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let runner = FakeRunner::default().respond("curl -fsSL", "kind: DaemonSet\n");

    NetworkPlugin::Flannel.deploy(&runner, &layout).await.unwrap();

    let manifest = layout.artifact("flannel-manifest.yaml");
    assert_eq!(
      runner.commands(),
      vec![
        format!(
          "curl -fsSL {}",
          "https://raw.githubusercontent.com/flannel-io/flannel/master/Documentation/kube-flannel.yml"
        ),
        format!(
          "kubectl --kubeconfig {} apply -f {}",
          layout.kubeconfig.display(),
          manifest.display()
        ),
      ]
    );
    assert_eq!(runner.writes(), vec![(manifest.clone(), 0o644)]);
    assert_eq!(fs::read_to_string(manifest).unwrap(), "kind: DaemonSet\n");
  }

  #[tokio::test]
  async fn it_stops_when_fetch_fails() {
    let dir = tempdir().unwrap();
    let layout = Layout::rooted(dir.path());
    let runner = FakeRunner::default().fail("curl", FailureReason::NonZeroExit(Some(22)));

    let err = NetworkPlugin::Calico.deploy(&runner, &layout).await.unwrap_err();

    assert_eq!(err.kind(), crate::ErrorKind::Execution);
    assert!(!runner.ran("kubectl"));
  }
}
