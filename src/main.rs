mod api;
mod cache;
mod commands;
mod config;
mod dashboard;
mod db;
mod query;
mod seed;
mod server;
mod timeline;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(about = "Project and task tracking backend with a caching client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL for client commands
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

/// Install the global subscriber. Logs go to `log_file` when set, stderr otherwise.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("taskboard=info,tower_http=info"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
      Ok(None)
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line wins over file and environment
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let _guard = init_tracing(config.log_file.as_ref())?;

  commands::run(args.command, &config).await
}
