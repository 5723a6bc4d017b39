//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{DeployConfig, Secret};
use crate::error::{DeployError, Result};

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// SSH username.
    pub user: String,

    /// How to prove who we are.
    pub auth: SshAuth,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,

    /// Upper bound for TCP connect plus handshake and authentication.
    pub connect_timeout: Option<Duration>,
}

/// Authentication method.
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(Secret),
    KeyFile(PathBuf),
}

/// Host key verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any host key (insecure, but matches OpenSSH StrictHostKeyChecking=no).
    #[default]
    AcceptAny,

    /// Accept new keys but reject changed keys (matches StrictHostKeyChecking=accept-new).
    AcceptNew,

    /// Only accept keys already present in known_hosts (StrictHostKeyChecking=yes).
    Strict,
}

impl SshConfig {
    /// Create a new SSH configuration using password authentication.
    pub fn with_password(user: impl Into<String>, password: Secret) -> Self {
        Self {
            user: user.into(),
            auth: SshAuth::Password(password),
            host_key_policy: HostKeyPolicy::AcceptAny,
            connect_timeout: None,
        }
    }
}

impl TryFrom<&DeployConfig> for SshConfig {
    type Error = DeployError;

    /// A configured key file takes precedence over a password.
    fn try_from(config: &DeployConfig) -> Result<Self> {
        let auth = match (config.key_path_expanded(), &config.password) {
            (Some(key_path), _) => SshAuth::KeyFile(key_path),
            (None, Some(password)) if !password.is_empty() => SshAuth::Password(password.clone()),
            _ => {
                return Err(DeployError::Config(
                    "No SSH credential configured".to_string(),
                ))
            }
        };

        Ok(Self {
            user: config.user.clone(),
            auth,
            host_key_policy: config.host_key_policy,
            connect_timeout: config.connect_timeout(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy_config() -> DeployConfig {
        DeployConfig {
            password: Some(Secret::new("hunter2")),
            ..DeployConfig::example()
        }
    }

    #[test]
    fn test_ssh_config_with_password() {
        let config = SshConfig::with_password("sa", Secret::new("pw"));

        assert_eq!(config.user, "sa");
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptAny);
        assert!(matches!(config.auth, SshAuth::Password(_)));
    }

    #[test]
    fn test_from_deploy_config_password() {
        let config = SshConfig::try_from(&deploy_config()).unwrap();

        assert_eq!(config.user, "deploy");
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptNew);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        match config.auth {
            SshAuth::Password(secret) => assert_eq!(secret.expose(), "hunter2"),
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_from_deploy_config_prefers_key() {
        let deploy = DeployConfig {
            key_path: Some("/tmp/id_ed25519".to_string()),
            ..deploy_config()
        };
        let config = SshConfig::try_from(&deploy).unwrap();

        assert!(matches!(config.auth, SshAuth::KeyFile(ref p) if p == &PathBuf::from("/tmp/id_ed25519")));
    }

    #[test]
    fn test_from_deploy_config_without_credential() {
        let deploy = DeployConfig {
            password: None,
            ..deploy_config()
        };
        assert!(SshConfig::try_from(&deploy).is_err());
    }
}
