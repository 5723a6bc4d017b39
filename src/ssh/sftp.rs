//! SFTP file transfer implementation.
//!
//! Replaces `scp` binary with native SFTP over SSH.

use std::path::Path;

use indicatif::ProgressBar;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DeployError, Result};
use crate::ssh::client::ClientHandler;

const CHUNK_SIZE: usize = 64 * 1024;

/// SFTP client for file transfers.
pub struct SftpClient {
    session: SftpSession,
}

impl SftpClient {
    /// Create a new SFTP client from an SSH session.
    pub async fn new(ssh_session: &Handle<ClientHandler>) -> Result<Self> {
        let channel = ssh_session
            .channel_open_session()
            .await
            .map_err(|e| DeployError::Ssh(format!("Failed to open SFTP channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| DeployError::Ssh(format!("Failed to request SFTP subsystem: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| DeployError::Sftp(format!("Failed to initialize SFTP: {}", e)))?;

        Ok(Self { session: sftp })
    }

    /// Upload a file to the remote host, streaming it in chunks.
    ///
    /// Returns the number of bytes written. The remote size is checked against
    /// the local one before returning.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        progress: &ProgressBar,
    ) -> Result<u64> {
        let local_path = local_path.as_ref();

        let mut local_file = tokio::fs::File::open(local_path).await.map_err(|e| {
            DeployError::Sftp(format!(
                "Failed to read local file {}: {}",
                local_path.display(),
                e
            ))
        })?;
        let expected = local_file.metadata().await?.len();
        progress.set_length(expected);

        let mut remote_file = self.session.create(remote_path).await.map_err(|e| {
            DeployError::Sftp(format!("Failed to create remote file {}: {}", remote_path, e))
        })?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            let n = local_file.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            remote_file
                .write_all(&buf[..n])
                .await
                .map_err(|e| DeployError::Sftp(format!("Failed to write to remote file: {}", e)))?;

            written += n as u64;
            progress.inc(n as u64);
        }

        // Ensure data is flushed
        remote_file
            .shutdown()
            .await
            .map_err(|e| DeployError::Sftp(format!("Failed to close remote file: {}", e)))?;

        let remote_size = self.session.metadata(remote_path).await?.size.unwrap_or(0);
        if remote_size != written {
            return Err(DeployError::Sftp(format!(
                "Size mismatch after upload: local {} bytes, remote {} bytes",
                written, remote_size
            )));
        }

        Ok(written)
    }

    /// Close the SFTP channel.
    pub async fn close(&self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }
}
