//! Release deployment over SSH.
//!
//! - [`plan`] - Builds the remote command lines from the configuration
//! - [`remote`] - The seam between workflow and transport
//! - [`report`] - Console output of a run
//! - [`runner`] - The clear / upload / extract / containers workflow

pub mod plan;
pub mod remote;
pub mod report;
pub mod runner;

pub use plan::DeployPlan;
pub use report::{ConsoleReporter, Reporter};
pub use runner::{run_session, DeployOptions, DeploySummary};

use crate::config::DeployConfig;
use crate::error::Result;
use crate::ssh::{SshClient, SshConfig};

/// Open an SSH session to the configured host.
pub async fn connect(config: &DeployConfig) -> Result<SshClient> {
    let ssh_config = SshConfig::try_from(config)?;
    tracing::debug!(
        "Connecting to {}@{}:{} ({:?})",
        config.user,
        config.host,
        config.port,
        config.host_key_policy
    );

    let client = SshClient::connect(&config.host, config.port, &ssh_config).await?;
    Ok(client.with_command_timeout(config.command_timeout()))
}

/// Connect, run the whole deployment, and disconnect.
pub async fn run(
    config: &DeployConfig,
    options: DeployOptions,
    reporter: &mut dyn Reporter,
) -> Result<DeploySummary> {
    let plan = DeployPlan::build(config);
    let client = connect(config).await?;
    run_session(&client, &plan, options, reporter).await
}
