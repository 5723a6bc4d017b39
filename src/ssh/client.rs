//! SSH client implementation using russh.
//!
//! Provides connection management, authentication, command execution and
//! file upload over a single session.

use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use russh::client::{self, Handle};
use tokio::sync::Mutex;

use crate::error::{DeployError, Result};
use crate::ssh::config::{HostKeyPolicy, SshAuth, SshConfig};
use crate::ssh::exec::CommandOutput;
use crate::ssh::sftp::SftpClient;

/// SSH client wrapper over russh.
pub struct SshClient {
    session: Arc<Mutex<Handle<ClientHandler>>>,
    sftp: Mutex<Option<SftpClient>>,
    host: String,
    command_timeout: Option<Duration>,
}

impl SshClient {
    /// Connect to an SSH server and authenticate.
    pub async fn connect(host: &str, port: u16, config: &SshConfig) -> Result<Self> {
        match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::open(host, port, config))
                .await
                .map_err(|_| DeployError::Timeout {
                    step: format!("Connecting to {}:{}", host, port),
                    elapsed: limit,
                })?,
            None => Self::open(host, port, config).await,
        }
    }

    async fn open(host: &str, port: u16, config: &SshConfig) -> Result<Self> {
        let russh_config = Arc::new(client::Config {
            // No inactivity timeout - long docker loads keep the session quiet
            inactivity_timeout: None,
            // Send keep-alive every 15 seconds
            keepalive_interval: Some(Duration::from_secs(15)),
            // Allow up to 4 missed keep-alives before disconnect (60 seconds)
            keepalive_max: 4,
            ..Default::default()
        });

        // Resolve hostname to IP
        let addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .map_err(|e| DeployError::Ssh(format!("Failed to resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| DeployError::Ssh(format!("No address found for {}", host)))?;

        let handler = ClientHandler {
            host: host.to_string(),
            port,
            host_key_policy: config.host_key_policy,
            known_hosts: None,
        };

        let mut session = client::connect(russh_config, addr, handler)
            .await
            .map_err(|e| DeployError::Ssh(format!("Connection failed: {}", e)))?;

        Self::authenticate(&mut session, config).await?;
        tracing::debug!("Authenticated as {}@{}", config.user, host);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            sftp: Mutex::new(None),
            host: host.to_string(),
            command_timeout: None,
        })
    }

    /// Bound every command run through [`SshClient::exec`].
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Authenticate with the SSH server.
    async fn authenticate(session: &mut Handle<ClientHandler>, config: &SshConfig) -> Result<()> {
        match &config.auth {
            SshAuth::Password(password) => {
                let accepted = session
                    .authenticate_password(&config.user, password.expose())
                    .await
                    .map_err(|e| DeployError::Ssh(format!("Password auth failed: {}", e)))?;

                if accepted {
                    Ok(())
                } else {
                    Err(DeployError::Ssh(format!(
                        "Authentication failed: server rejected the password for '{}'",
                        config.user
                    )))
                }
            }
            SshAuth::KeyFile(key_path) => Self::auth_with_key_file(session, config, key_path).await,
        }
    }

    /// Authenticate using key file directly.
    async fn auth_with_key_file(
        session: &mut Handle<ClientHandler>,
        config: &SshConfig,
        key_path: &Path,
    ) -> Result<()> {
        let key = russh_keys::load_secret_key(key_path, None).map_err(|e| {
            DeployError::Ssh(format!("Failed to load key {}: {}", key_path.display(), e))
        })?;

        let auth_result = session
            .authenticate_publickey(&config.user, Arc::new(key))
            .await
            .map_err(|e| DeployError::Ssh(format!("Authentication failed: {}", e)))?;

        if auth_result {
            Ok(())
        } else {
            Err(DeployError::Ssh(format!(
                "Authentication failed: server rejected key {}",
                key_path.display()
            )))
        }
    }

    /// Execute a command on the remote host (non-interactive).
    pub async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let session = self.session.lock().await;
        let run = crate::ssh::exec::exec_command(&session, command, stdin);

        match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| DeployError::Timeout {
                    step: "Remote command".to_string(),
                    elapsed: limit,
                })?,
            None => run.await,
        }
    }

    /// Upload a file over the session's SFTP channel, opening it on first use.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &ProgressBar,
    ) -> Result<u64> {
        let mut sftp = self.sftp.lock().await;

        if sftp.is_none() {
            let session = self.session.lock().await;
            *sftp = Some(SftpClient::new(&session).await?);
        }

        match sftp.as_ref() {
            Some(client) => client.upload(local_path, remote_path, progress).await,
            None => Err(DeployError::Sftp("SFTP channel unavailable".to_string())),
        }
    }

    /// Close the SFTP channel (if any), then the session.
    ///
    /// Both are attempted; the first error is returned.
    pub async fn close(&self) -> Result<()> {
        let sftp_result = match self.sftp.lock().await.take() {
            Some(sftp) => sftp.close().await,
            None => Ok(()),
        };

        let session = self.session.lock().await;
        let session_result = session
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| DeployError::Ssh(format!("Failed to disconnect: {}", e)));

        sftp_result.and(session_result)
    }
}

/// Client handler for russh connection callbacks.
pub struct ClientHandler {
    pub host: String,
    pub port: u16,
    pub host_key_policy: HostKeyPolicy,
    /// known_hosts file to consult; `None` means `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
}

impl ClientHandler {
    fn check_known(&self, key: &russh_keys::PublicKey) -> std::result::Result<bool, russh_keys::Error> {
        match &self.known_hosts {
            Some(path) => russh_keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh_keys::check_known_hosts(&self.host, self.port, key),
        }
    }

    fn learn(&self, key: &russh_keys::PublicKey) -> std::result::Result<(), russh_keys::Error> {
        match &self.known_hosts {
            Some(path) => {
                russh_keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path)
            }
            None => russh_keys::known_hosts::learn_known_hosts(&self.host, self.port, key),
        }
    }

    /// Decide whether to trust the server key under the configured policy.
    fn verify_host_key(&self, key: &russh_keys::PublicKey) -> bool {
        if self.host_key_policy == HostKeyPolicy::AcceptAny {
            return true;
        }

        match self.check_known(key) {
            Ok(true) => true,
            Ok(false) if self.host_key_policy == HostKeyPolicy::AcceptNew => {
                tracing::info!("Adding {} to known_hosts", self.host);
                if let Err(e) = self.learn(key) {
                    tracing::warn!("Failed to record host key for {}: {}", self.host, e);
                }
                true
            }
            Ok(false) => {
                tracing::error!("Host key for {} is not in known_hosts", self.host);
                false
            }
            Err(e) => {
                tracing::error!("Host key verification failed for {}: {}", self.host, e);
                false
            }
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = DeployError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify_host_key(server_public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    const SERVER_KEY: &str =
        "AAAAC3NzaC1lZDI1NTE5AAAAIJdD7y3aLq454yWBdwLWbieU1ebz9/cu7/QEXn9OIeZJ";
    const OTHER_KEY: &str =
        "AAAAC3NzaC1lZDI1NTE5AAAAIA6rWI3G1sz07DnfFlrouTcysQlj2P+jpNSOEWD9OJ3X";

    fn handler(policy: HostKeyPolicy, known_hosts: &Path) -> ClientHandler {
        ClientHandler {
            host: "10.0.0.5".to_string(),
            port: 2222,
            host_key_policy: policy,
            known_hosts: Some(known_hosts.to_path_buf()),
        }
    }

    fn key(base64: &str) -> russh_keys::PublicKey {
        russh_keys::parse_public_key_base64(base64).unwrap()
    }

    #[test]
    fn test_accept_any_skips_known_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");

        assert!(handler(HostKeyPolicy::AcceptAny, &path).verify_host_key(&key(SERVER_KEY)));
        assert!(!path.exists());
    }

    #[test]
    fn test_strict_rejects_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");

        assert!(!handler(HostKeyPolicy::Strict, &path).verify_host_key(&key(SERVER_KEY)));
        assert!(!path.exists());
    }

    #[test]
    fn test_strict_accepts_recorded_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(
            &path,
            format!("[10.0.0.5]:2222 ssh-ed25519 {}\n", SERVER_KEY),
        )
        .unwrap();

        let strict = handler(HostKeyPolicy::Strict, &path);
        assert!(strict.verify_host_key(&key(SERVER_KEY)));
        assert!(!strict.verify_host_key(&key(OTHER_KEY)));
    }

    #[test]
    fn test_accept_new_records_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");

        assert!(handler(HostKeyPolicy::AcceptNew, &path).verify_host_key(&key(SERVER_KEY)));

        let recorded = std::fs::read_to_string(&path).unwrap();
        assert!(recorded.contains("[10.0.0.5]:2222 ssh-ed25519"));
        assert!(handler(HostKeyPolicy::Strict, &path).verify_host_key(&key(SERVER_KEY)));
    }

    #[test]
    fn test_accept_new_rejects_changed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(
            &path,
            format!("[10.0.0.5]:2222 ssh-ed25519 {}\n", SERVER_KEY),
        )
        .unwrap();

        assert!(!handler(HostKeyPolicy::AcceptNew, &path).verify_host_key(&key(OTHER_KEY)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SshConfig::with_password("sa", Secret::new("pw"));
        let result = SshClient::connect("127.0.0.1", port, &config).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Accept TCP but never speak SSH
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = SshConfig {
            connect_timeout: Some(Duration::from_millis(200)),
            ..SshConfig::with_password("sa", Secret::new("pw"))
        };
        let err = SshClient::connect("127.0.0.1", port, &config)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DeployError::Timeout { .. }));
    }
}
