use std::fmt;

use tracing::info;

use crate::{exec::Execute, Layout, Result};

const MONITORING_NAMESPACE: &str = "monitoring";
const LOGGING_NAMESPACE: &str = "logging";

/// Chart repositories added before any release is installed, as `(name, url)`
const MONITORING_REPOS: [(&str, &str); 1] = [(
  "prometheus-community",
  "https://prometheus-community.github.io/helm-charts",
)];
const LOGGING_REPOS: [(&str, &str); 2] = [
  ("elastic", "https://helm.elastic.co"),
  ("fluent", "https://fluent.github.io/helm-charts"),
];

/// Optional cluster add-ons installed with helm once the control plane is up
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Addon {
  /// Prometheus stack in the `monitoring` namespace
  Monitoring,
  /// Elasticsearch, Fluent Bit and Kibana in the `logging` namespace
  Logging,
}

impl Addon {
  /// Commands that install the add-on, in order
  pub fn commands(&self, layout: &Layout) -> Vec<String> {
    let kubeconfig = layout.kubeconfig.display().to_string();
    let upgrade = |release: &str, chart: &str, namespace: &str, extra: &str| {
      format!("helm upgrade --install {release} {chart} --namespace {namespace} --kubeconfig {kubeconfig}{extra}")
    };
    let repo_add = |(name, url): &(&str, &str)| format!("helm repo add {name} {url} --force-update");

    match self {
      Self::Monitoring => MONITORING_REPOS
        .iter()
        .map(repo_add)
        .chain([
          "helm repo update".to_string(),
          upgrade(
            "prometheus",
            "prometheus-community/kube-prometheus-stack",
            MONITORING_NAMESPACE,
            " --create-namespace",
          ),
        ])
        .collect(),
      Self::Logging => [format!(
        "kubectl --kubeconfig {kubeconfig} create namespace {LOGGING_NAMESPACE} --dry-run=client -o yaml | kubectl --kubeconfig {kubeconfig} apply -f -"
      )]
      .into_iter()
      .chain(LOGGING_REPOS.iter().map(repo_add))
      .chain([
        "helm repo update".to_string(),
        upgrade(
          "elasticsearch",
          "elastic/elasticsearch",
          LOGGING_NAMESPACE,
          " --set replicas=1,resources.requests.cpu=100m,resources.requests.memory=512Mi",
        ),
        upgrade("fluent-bit", "fluent/fluent-bit", LOGGING_NAMESPACE, ""),
        upgrade("kibana", "elastic/kibana", LOGGING_NAMESPACE, ""),
      ])
      .collect(),
    }
  }

  pub async fn install(&self, runner: &dyn Execute, layout: &Layout) -> Result<()> {
    info!("Installing {self} add-on");
    for command in self.commands(layout) {
      runner.run(&command).await?;
    }

    Ok(())
  }
}

impl fmt::Display for Addon {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Monitoring => write!(f, "monitoring"),
      Self::Logging => write!(f, "logging"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{testing::FakeRunner, FailureReason};

  fn layout() -> Layout {
    Layout::rooted("/stage")
  }

  #[test]
  fn it_installs_monitoring_stack() {
    insta::assert_snapshot!(Addon::Monitoring.commands(&layout()).join("\n"), @r###"
    helm repo add prometheus-community https://prometheus-community.github.io/helm-charts --force-update
    helm repo update
    helm upgrade --install prometheus prometheus-community/kube-prometheus-stack --namespace monitoring --kubeconfig /stage/root/.kube/config --create-namespace
    "###);
  }

  #[test]
  fn it_installs_logging_stack() {
    let commands = Addon::Logging.commands(&layout());

    assert!(commands[0].contains("create namespace logging --dry-run=client"));
    assert_eq!(
      commands.iter().filter(|c| c.starts_with("helm repo add")).count(),
      2
    );
    let releases: Vec<&str> = commands
      .iter()
      .filter_map(|c| c.strip_prefix("helm upgrade --install "))
      .filter_map(|c| c.split_whitespace().next())
      .collect();
    assert_eq!(releases, vec!["elasticsearch", "fluent-bit", "kibana"]);
    assert!(commands.iter().all(|c| !c.contains(';')));
  }

  #[tokio::test]
  async fn it_stops_at_first_failure() {
    let runner = FakeRunner::default().fail("helm repo update", FailureReason::Timeout);

    let err = Addon::Monitoring.install(&runner, &layout()).await.unwrap_err();

    assert_eq!(err.kind(), crate::ErrorKind::Execution);
    assert!(!runner.ran("helm upgrade"));
  }
}
