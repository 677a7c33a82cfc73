//! chunkflow command-line client entry point.

mod commands;
mod config;
mod ledger;
mod listen;
mod upload;

use std::path::PathBuf;

use anyhow::Context;
use chunkflow_uploader::HttpUploadService;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ledger::ResumeLedger;
use crate::upload::UploadArgs;

#[derive(Debug, Parser)]
#[command(name = "chunkflow", version, about = "Resumable chunked uploads")]
struct Cli {
    /// Base URL of the upload API
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token for the upload API
    #[arg(long, global = true)]
    token: Option<String>,

    /// Configuration file (defaults to the per-user location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file, resuming an interrupted upload of it
    Upload(UploadArgs),
    /// Show the server-side state of an upload
    Status { upload_id: String },
    /// Discard a partial upload on the server
    Cancel { upload_id: String },
    /// Purge expired uploads on the server
    Cleanup,
    /// Print notifications for an owner until Ctrl-C
    Listen {
        #[arg(long)]
        owner: Option<i64>,
    },
}

impl Cli {
    /// Global flags override values from the configuration file.
    fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(token) = &self.token {
            config.auth_token = Some(token.clone());
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    cli.apply(&mut config);
    tracing::debug!(server = %config.server_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config, ResumeLedger::path_for(&config_path)))
}

async fn run(command: Command, config: Config, ledger_path: PathBuf) -> anyhow::Result<()> {
    match command {
        Command::Upload(args) => upload::run(config, ledger_path, args).await,
        Command::Status { upload_id } => {
            let service = HttpUploadService::new(&config.service_config())?;
            commands::status(&service, &upload_id).await
        }
        Command::Cancel { upload_id } => {
            let service = HttpUploadService::new(&config.service_config())?;
            commands::cancel(&service, &upload_id).await
        }
        Command::Cleanup => {
            let service = HttpUploadService::new(&config.service_config())?;
            commands::cleanup(&service).await
        }
        Command::Listen { owner } => {
            let owner_id = owner
                .or(config.owner_id)
                .context("no owner id: pass --owner or set owner_id in the config file")?;
            listen::run(&config, owner_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload_with_overrides() {
        let cli = Cli::try_parse_from([
            "chunkflow",
            "upload",
            "report.pdf",
            "--owner",
            "12",
            "--chunk-size",
            "1048576",
            "--concurrency",
            "5",
            "--no-verify",
            "--server",
            "http://files.internal/api",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("http://files.internal/api"));
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.file, PathBuf::from("report.pdf"));
        assert_eq!(args.owner, Some(12));
        assert_eq!(args.chunk_size, Some(1_048_576));
        assert_eq!(args.concurrency, Some(5));
        assert!(args.retries.is_none());
        assert!(args.no_verify);
    }

    #[test]
    fn global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "chunkflow",
            "--token",
            "t0k",
            "--server",
            "https://x/api",
            "status",
            "abc",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.server_url, "https://x/api");
        assert_eq!(config.auth_token.as_deref(), Some("t0k"));
        assert!(matches!(cli.command, Command::Status { ref upload_id } if upload_id == "abc"));
    }

    #[test]
    fn status_requires_upload_id() {
        assert!(Cli::try_parse_from(["chunkflow", "status"]).is_err());
    }
}
