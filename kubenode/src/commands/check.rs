use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  distro::{DistroProfile, DEFAULT_CHANNEL},
  host::HostFacts,
  prereq::PrerequisiteChecker,
};

#[derive(Args, Debug, Default, Serialize, Deserialize)]
pub struct Check {
  /// Skip probing the control plane ports
  #[arg(long)]
  pub skip_ports: bool,
}

impl Check {
  pub async fn check(&self) -> Result<()> {
    let facts = HostFacts::capture()?;
    println!("{}", serde_yaml::to_string(&facts)?);

    let profile = DistroProfile::detect(&facts, DEFAULT_CHANNEL)?;
    info!("Distribution {} is supported", profile.distro);

    let mut checker = PrerequisiteChecker::default();
    if self.skip_ports {
      checker.ports.clear();
    }
    checker.check(&facts).await?;

    Ok(())
  }
}
