use std::{collections::BTreeMap, net::IpAddr, path::Path};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{exec::Execute, Error, Result};

pub const API_VERSION: &str = "kubeadm.k8s.io/v1beta3";
pub const API_SERVER_PORT: u16 = 6443;

/// Parse a CIDR, rejecting out-of-range prefixes and addresses with host bits set
pub fn validate_cidr(cidr: &str) -> Result<IpNet> {
  let net: IpNet = cidr.trim().parse().map_err(|_| Error::InvalidCidr(cidr.to_owned()))?;
  if net.trunc() != net {
    return Err(Error::InvalidCidr(cidr.to_owned()));
  }

  Ok(net)
}

/// Cluster-wide settings for `kubeadm init`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
  /// APIVersion defines the versioned schema of this representation of an object.
  api_version: String,

  /// Kind is a string value representing the REST resource this object represents.
  kind: String,

  /// KubernetesVersion is the target version of the control plane
  #[serde(skip_serializing_if = "Option::is_none")]
  kubernetes_version: Option<String>,

  /// Networking holds configuration for the networking topology of the cluster
  networking: Networking,

  /// ControllerManager contains extra settings for the controller manager control plane component
  controller_manager: ControlPlaneComponent,

  /// Scheduler contains extra settings for the scheduler control plane component
  scheduler: ControlPlaneComponent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Networking {
  /// PodSubnet is the subnet used by pods
  pod_subnet: String,

  /// ServiceSubnet is the subnet used by Kubernetes services
  service_subnet: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlPlaneComponent {
  /// ExtraArgs is an extra set of flags to pass to the control plane component
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  extra_args: BTreeMap<String, String>,
}

impl ControlPlaneComponent {
  fn bind_all() -> Self {
    Self {
      extra_args: BTreeMap::from([("bind-address".to_string(), "0.0.0.0".to_string())]),
    }
  }
}

impl ClusterConfiguration {
  pub fn new(pod_subnet: &IpNet, service_subnet: &IpNet, kubernetes_version: Option<&str>) -> Self {
    ClusterConfiguration {
      api_version: API_VERSION.to_string(),
      kind: "ClusterConfiguration".to_string(),
      kubernetes_version: kubernetes_version.map(str::to_owned),
      networking: Networking {
        pod_subnet: pod_subnet.to_string(),
        service_subnet: service_subnet.to_string(),
      },
      controller_manager: ControlPlaneComponent::bind_all(),
      scheduler: ControlPlaneComponent::bind_all(),
    }
  }
}

/// Node-local settings for `kubeadm init`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfiguration {
  api_version: String,
  kind: String,

  /// LocalAPIEndpoint represents the endpoint of the API server instance deployed on this node
  #[serde(rename = "localAPIEndpoint")]
  local_api_endpoint: ApiEndpoint,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEndpoint {
  advertise_address: String,
  bind_port: u16,
}

impl InitConfiguration {
  pub fn new(advertise_address: IpAddr) -> Self {
    InitConfiguration {
      api_version: API_VERSION.to_string(),
      kind: "InitConfiguration".to_string(),
      local_api_endpoint: ApiEndpoint {
        advertise_address: advertise_address.to_string(),
        bind_port: API_SERVER_PORT,
      },
    }
  }
}

/// The multi-document descriptor passed to `kubeadm init --config`
#[derive(Debug)]
pub struct InitDescriptor {
  pub init: Option<InitConfiguration>,
  pub cluster: ClusterConfiguration,
}

impl InitDescriptor {
  /// Build the descriptor, advertising `advertise_address` unless it is a loopback address
  pub fn new(cluster: ClusterConfiguration, advertise_address: IpAddr) -> Self {
    let init = match advertise_address.is_loopback() {
      true => None,
      false => Some(InitConfiguration::new(advertise_address)),
    };

    Self { init, cluster }
  }

  pub fn render(&self) -> Result<String> {
    let mut docs = Vec::new();
    if let Some(init) = &self.init {
      docs.push(to_yaml(init)?);
    }
    docs.push(to_yaml(&self.cluster)?);

    Ok(docs.join("---\n"))
  }

  pub async fn write(&self, runner: &dyn Execute, path: &Path) -> Result<()> {
    let rendered = self.render()?;
    runner.write(path, rendered.as_bytes(), 0o600).await?;
    Ok(())
  }
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
  serde_yaml::to_string(value).map_err(|e| Error::Render {
    what: "kubeadm configuration",
    reason: e.to_string(),
  })
}
