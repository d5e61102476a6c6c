use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::{
  commands,
  exec::{CommandRunner, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT},
};

/// Styles for CLI
fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightCyan))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  /// Seconds each command attempt may run before it is killed
  #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT.as_secs())]
  pub timeout: u64,

  /// Attempts made for each command before the run is aborted
  #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES)]
  pub retries: u32,

  /// Also append log output to this file
  #[arg(long, global = true)]
  pub log_file: Option<PathBuf>,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,
}

impl Cli {
  pub fn runner(&self) -> CommandRunner {
    CommandRunner::new(RetryPolicy {
      timeout: Duration::from_secs(self.timeout),
      max_retries: self.retries,
      ..RetryPolicy::default()
    })
  }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Provision this host as a control plane or worker node
  ///
  /// Checks prerequisites, configures the kernel, installs containerd and the cluster
  /// tooling, then either initializes the control plane or joins an existing cluster
  Bootstrap(commands::bootstrap::Bootstrap),

  /// Report host facts and verify the host meets the node prerequisites without changing it
  Check(commands::check::Check),

  /// Create a new bootstrap token and save the worker join command
  Token(commands::token::Token),

  /// Show the state of the cluster nodes and pods
  Health(commands::health::Health),

  /// Back up the cluster configuration and reset this host
  Reset(commands::reset::Reset),
}
