use std::{fs::OpenOptions, process::ExitCode, sync::Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use kubenode::{Cli, Commands};
use tracing::error;
use tracing_log::AsTrace;
use tracing_subscriber::{
  fmt::writer::{BoxMakeWriter, MakeWriterExt},
  FmtSubscriber,
};

fn make_writer(cli: &Cli) -> Result<BoxMakeWriter> {
  match &cli.log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("unable to open log file {}", path.display()))?;
      Ok(BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))))
    }
    None => Ok(BoxMakeWriter::new(std::io::stderr)),
  }
}

async fn execute(cli: &Cli) -> Result<()> {
  let runner = cli.runner();

  match &cli.command {
    Commands::Bootstrap(bootstrap) => bootstrap.bootstrap(&runner).await,
    Commands::Check(check) => check.check().await,
    Commands::Token(token) => token.create(&runner, &token.layout()).await.map(|_| ()),
    Commands::Health(health) => {
      let report = health.report(&runner, &health.layout()).await?;
      print!("{report}");
      Ok(())
    }
    Commands::Reset(reset) => reset.reset(&runner, &kubenode::Layout::default()).await,
  }
}

#[cfg(not(tarpaulin_include))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let writer = match make_writer(&cli) {
    Ok(writer) => writer,
    Err(err) => {
      eprintln!("{err:#}");
      return ExitCode::FAILURE;
    }
  };
  let subscriber = FmtSubscriber::builder()
    .with_max_level(cli.verbose.log_level_filter().as_trace())
    .without_time()
    .with_ansi(!cli.no_color && cli.log_file.is_none())
    .with_writer(writer)
    .finish();
  // Scoped to this thread; the current-thread runtime keeps every task on it
  let _guard = tracing::subscriber::set_default(subscriber);

  match execute(&cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      error!("{err:#}");
      ExitCode::FAILURE
    }
  }
}
