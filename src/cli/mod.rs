pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DeployConfig;
use crate::deploy::DeployOptions;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "dropship")]
#[command(version)]
#[command(about = "Ship a release archive to a server and restart its containers")]
#[command(long_about = "Clear the release directory on the server, upload the local archive over SFTP, \
unpack it, load the docker images and restart the compose stack.\n\nEverything runs over a single SSH session.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the deployment config (default: ./dropship.yaml)
    #[arg(short, long, global = true, env = "DROPSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter dropship.yaml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,

        /// Skip the prompts and write the example values
        #[arg(long)]
        defaults: bool,
    },

    /// Run the deployment
    Deploy {
        /// Don't ask before wiping the release directory
        #[arg(short, long)]
        yes: bool,

        /// Continue with the next step when a remote command fails
        #[arg(long)]
        keep_going: bool,

        /// Extract the archive already on the server when the local one is missing
        #[arg(long)]
        allow_missing_archive: bool,
    },

    /// Show the remote commands a deployment would run
    Plan,

    /// Verify that the server accepts the configured credentials
    Check,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config_path = DeployConfig::resolve_path(self.config.as_deref());

        match self.command {
            Commands::Init { force, defaults } => {
                commands::init::execute(&config_path, force, defaults).await
            }
            Commands::Deploy {
                yes,
                keep_going,
                allow_missing_archive,
            } => {
                let config = DeployConfig::load(&config_path)?;
                let options = DeployOptions {
                    keep_going,
                    allow_missing_archive,
                };
                commands::deploy::execute(&config, options, yes).await
            }
            Commands::Plan => {
                let config = DeployConfig::load(&config_path)?;
                commands::plan::execute(&config).await
            }
            Commands::Check => {
                let config = DeployConfig::load(&config_path)?;
                commands::check::execute(&config).await
            }
        }
    }
}
