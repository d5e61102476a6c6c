//! Control plane initialization artifacts and the add-ons deployed on top of it

pub mod addons;
pub mod backup;
pub mod config;
pub mod join;
pub mod plugin;

pub use addons::Addon;
pub use backup::backup_cluster_config;
pub use config::{validate_cidr, ClusterConfiguration, InitDescriptor};
pub use join::{JoinCommand, JOIN_COMMAND_FILE};
pub use plugin::NetworkPlugin;

/// Generated admin credentials, relative to the host root
pub const ADMIN_CONF_PATH: &str = "/etc/kubernetes/admin.conf";

/// File name of the rendered `kubeadm init` descriptor in the work directory
pub const INIT_CONFIG_FILE: &str = "kubeadm-config.yaml";
