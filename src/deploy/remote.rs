//! The server side of a deployment, as seen by the deployer.

use std::path::Path;

use async_trait::async_trait;
use indicatif::ProgressBar;

use crate::deploy::plan::RemoteCommand;
use crate::error::{DeployError, Result};
use crate::ssh::{CommandOutput, SshClient};

/// Operations the deployer needs from a connected host.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Copy a local file to `remote_path`, returning the bytes written.
    async fn upload(&self, local_path: &Path, remote_path: &str, progress: &ProgressBar)
        -> Result<u64>;

    /// Release the file-transfer channel and the session.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl RemoteHost for SshClient {
    async fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        tracing::debug!("[{}] {}", command.step, command.command);
        let stdin = command.stdin_bytes();

        SshClient::exec(self, &command.command, stdin.as_deref())
            .await
            .map_err(|e| match e {
                DeployError::Timeout { elapsed, .. } => DeployError::Timeout {
                    step: command.label.clone(),
                    elapsed,
                },
                other => other,
            })
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &ProgressBar,
    ) -> Result<u64> {
        SshClient::upload(self, local_path, remote_path, progress).await
    }

    async fn close(&self) -> Result<()> {
        SshClient::close(self).await
    }
}
