use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::ssh::config::HostKeyPolicy;
use crate::utils::parse_duration;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dropship.yaml";

const PASSWORD_ENV: &str = "DROPSHIP_PASSWORD";
const SUDO_PASSWORD_ENV: &str = "DROPSHIP_SUDO_PASSWORD";

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How container commands gain root on the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SudoMode {
    /// `sudo -S`, password fed through the command's stdin.
    #[default]
    Password,
    /// `sudo -n`, the remote sudoers entry must not ask for a password.
    Passwordless,
    /// Run docker directly.
    None,
}

/// What to do when the local archive is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingArchivePolicy {
    /// Stop before touching the archive on the server.
    #[default]
    Abort,
    /// Report it and extract whatever archive a previous run left behind.
    Continue,
}

/// Everything a deployment needs, loaded once from `dropship.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<String>,

    pub local_archive: String,
    pub remote_archive: String,
    pub release_dir: String,
    /// Where the archive is unpacked (default: directory of `remote_archive`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_dir: Option<String>,

    pub images_dir: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub compose_dir: String,

    #[serde(default)]
    pub sudo: SudoMode,
    /// Falls back to `password` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo_password: Option<Secret>,
    #[serde(default)]
    pub on_missing_archive: MissingArchivePolicy,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> String {
    "30s".to_string()
}

impl DeployConfig {
    /// Pick the config file: an explicit path wins, otherwise `./dropship.yaml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        match explicit {
            Some(path) => PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Read, resolve and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::Config(format!(
                "Config file not found: {}. Run 'dropship init' first.",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_yaml(&content)?;

        if config.password.as_ref().is_none_or(Secret::is_empty) {
            if let Ok(password) = std::env::var(PASSWORD_ENV) {
                config.password = Some(Secret::new(password));
            }
        }

        if config.sudo_password.as_ref().is_none_or(Secret::is_empty) {
            if let Ok(password) = std::env::var(SUDO_PASSWORD_ENV) {
                config.sudo_password = Some(Secret::new(password));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML and resolve `${VAR}` references. Does not validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: DeployConfig = serde_yaml::from_str(content)
            .map_err(|e| DeployError::Config(format!("Invalid {}: {}", DEFAULT_CONFIG_FILE, e)))?;

        config.resolve_env_refs()?;
        Ok(config)
    }

    fn resolve_env_refs(&mut self) -> Result<()> {
        let resolve = |value: &mut String| -> Result<()> {
            *value = resolve_env_value(value)?;
            Ok(())
        };

        resolve(&mut self.host)?;
        resolve(&mut self.user)?;
        resolve(&mut self.local_archive)?;
        resolve(&mut self.remote_archive)?;
        resolve(&mut self.release_dir)?;
        resolve(&mut self.images_dir)?;
        resolve(&mut self.compose_dir)?;

        for value in [&mut self.key_path, &mut self.extract_dir]
            .into_iter()
            .flatten()
        {
            resolve(value)?;
        }

        for secret in [&mut self.password, &mut self.sudo_password]
            .into_iter()
            .flatten()
        {
            *secret = Secret::new(resolve_env_value(secret.expose())?);
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error for anything that would make the deployment unsafe or
    /// impossible to run (e.g. wiping `/`, missing credentials).
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DeployError::Config("host must not be empty".to_string()));
        }

        if self.user.trim().is_empty() {
            return Err(DeployError::Config("user must not be empty".to_string()));
        }

        let has_password = self.password.as_ref().is_some_and(|p| !p.is_empty());
        if !has_password && self.key_path.is_none() {
            return Err(DeployError::Config(format!(
                "No SSH credential configured. Set 'password', 'key_path' or {}",
                PASSWORD_ENV
            )));
        }

        if let Some(key_path) = self.key_path_expanded() {
            if !key_path.exists() {
                return Err(DeployError::Config(format!(
                    "SSH key not found at '{}'",
                    key_path.display()
                )));
            }
        }

        if self.sudo == SudoMode::Password && self.sudo_password().is_none() {
            return Err(DeployError::Config(
                "sudo: password requires 'sudo_password' or 'password'".to_string(),
            ));
        }

        let release_dir = self.release_dir.trim_end_matches('/');
        let segments: Vec<&str> = release_dir
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        if segments.contains(&"..") {
            return Err(DeployError::Config(format!(
                "release_dir must not contain '..', got '{}'",
                self.release_dir
            )));
        }
        if segments.is_empty() {
            return Err(DeployError::Config(format!(
                "release_dir must not be empty or '/', got '{}'",
                self.release_dir
            )));
        }

        for (field, value) in [
            ("release_dir", release_dir),
            ("remote_archive", self.remote_archive.as_str()),
            ("images_dir", self.images_dir.as_str()),
            ("compose_dir", self.compose_dir.as_str()),
            ("extract_dir", self.extract_dir().as_str()),
        ] {
            if !value.starts_with('/') {
                return Err(DeployError::Config(format!(
                    "{} must be an absolute remote path, got '{}'",
                    field, value
                )));
            }
        }

        if self.remote_archive.ends_with('/') {
            return Err(DeployError::Config(format!(
                "remote_archive must name a file, got '{}'",
                self.remote_archive
            )));
        }

        if parse_duration(&self.connect_timeout).is_none() {
            return Err(DeployError::Config(format!(
                "Invalid connect_timeout '{}'. Use format like '30s', '2m', or '60'",
                self.connect_timeout
            )));
        }

        if let Some(timeout) = &self.command_timeout {
            if parse_duration(timeout).is_none() {
                return Err(DeployError::Config(format!(
                    "Invalid command_timeout '{}'. Use format like '30m', '1h', or '600'",
                    timeout
                )));
            }
        }

        Ok(())
    }

    /// Release directory without trailing slashes.
    pub fn release_dir(&self) -> &str {
        self.release_dir.trim_end_matches('/')
    }

    pub fn extract_dir(&self) -> String {
        match &self.extract_dir {
            Some(dir) => dir.clone(),
            None => remote_parent(&self.remote_archive),
        }
    }

    pub fn local_archive_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.local_archive).as_ref())
    }

    pub fn key_path_expanded(&self) -> Option<PathBuf> {
        self.key_path
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }

    pub fn sudo_password(&self) -> Option<&Secret> {
        self.sudo_password
            .as_ref()
            .or(self.password.as_ref())
            .filter(|p| !p.is_empty())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        parse_duration(&self.connect_timeout)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.as_deref().and_then(parse_duration)
    }

    /// A starting point written by `dropship init`.
    pub fn example() -> Self {
        Self {
            host: "10.0.0.5".to_string(),
            port: default_port(),
            user: "deploy".to_string(),
            password: Some(Secret::new("${DEPLOY_SSH_PASSWORD}")),
            key_path: None,
            host_key_policy: HostKeyPolicy::AcceptNew,
            connect_timeout: default_connect_timeout(),
            command_timeout: Some("30m".to_string()),
            local_archive: "./transport.tar.gz".to_string(),
            remote_archive: "/home/deploy/release/transport.tar.gz".to_string(),
            release_dir: "/home/deploy/release/app_release".to_string(),
            extract_dir: None,
            images_dir: "/home/deploy/release/app_release".to_string(),
            images: vec!["frontend.tar".to_string(), "backend.tar".to_string()],
            compose_dir: "/home/deploy/release".to_string(),
            sudo: SudoMode::Password,
            sudo_password: None,
            on_missing_archive: MissingArchivePolicy::Abort,
        }
    }

    /// Write the configuration, readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| DeployError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }
}

/// Parent directory of a remote (always `/`-separated) path.
fn remote_parent(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

/// Resolve `${VAR}` and `${VAR:-default}` references.
///
/// Bare `$VAR` is left alone so passwords containing `$` survive.
fn resolve_env_value(value: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| DeployError::Config(format!("Invalid env pattern: {}", e)))?;

    Ok(re
        .replace_all(value, |caps: &regex_lite::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}
