//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `download`: Track, album, playlist and artist downloads
//! - `tools`: Service listing, config bootstrap and tool checks

mod download;
mod tools;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::model::DownloadMode;

pub use download::cmd_download;
pub use tools::{cmd_check_tools, cmd_init_config, cmd_services};

/// Music Courier CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the one in the config directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// What an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl From<Kind> for DownloadMode {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Track => DownloadMode::Track,
            Kind::Album => DownloadMode::Album,
            Kind::Playlist => DownloadMode::Playlist,
            Kind::Artist => DownloadMode::Artist,
        }
    }
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Download one or more ids from a service
    Download {
        /// Service name, as registered in the config
        service: String,
        /// What the ids refer to
        #[arg(value_enum)]
        kind: Kind,
        /// Ids to download, in order
        #[arg(required = true)]
        ids: Vec<String>,
        /// Download root, overriding the configured path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the configured services and what they support
    Services,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Check if ffmpeg is installed
    CheckTools,
}

/// Run the parsed command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Download {
            service,
            kind,
            ids,
            output,
        } => {
            let rt = Runtime::new()?;
            cmd_download(
                &rt,
                cli.config.as_deref(),
                output.as_deref(),
                service,
                (*kind).into(),
                ids,
            )
        }
        Commands::Services => cmd_services(cli.config.as_deref()),
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), *force),
        Commands::CheckTools => cmd_check_tools(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "music-courier",
            "download",
            "tidal",
            "album",
            "123",
            "456",
            "--output",
            "/music",
        ])
        .unwrap();
        let Commands::Download {
            service,
            kind,
            ids,
            output,
        } = cli.command
        else {
            panic!("expected download");
        };
        assert_eq!(service, "tidal");
        assert_eq!(DownloadMode::from(kind), DownloadMode::Album);
        assert_eq!(ids, vec!["123", "456"]);
        assert_eq!(output, Some(PathBuf::from("/music")));
    }

    #[test]
    fn test_download_needs_an_id() {
        assert!(Cli::try_parse_from(["music-courier", "download", "tidal", "track"]).is_err());
        assert!(Cli::try_parse_from(["music-courier", "download", "tidal", "song", "1"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["music-courier", "services", "--config", "/etc/courier.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/courier.toml")));
    }
}
