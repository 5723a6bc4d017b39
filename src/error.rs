use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSH connection error: {0}")]
    Ssh(String),

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("Local archive not found: {0}")]
    ArchiveMissing(String),

    #[error("{step} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        step: String,
        exit_code: u32,
        stderr: String,
    },

    #[error("{step} timed out after {elapsed:?}")]
    Timeout {
        step: String,
        elapsed: std::time::Duration,
    },

    #[error("Deployment aborted: {0}")]
    Aborted(String),

    #[error("{count} step(s) failed: {steps}")]
    StepsFailed { count: usize, steps: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Dialog error: {0}")]
    Dialog(#[from] dialoguer::Error),

    #[error("SSH protocol error: {0}")]
    SshProtocol(#[from] russh::Error),

    #[error("SFTP protocol error: {0}")]
    SftpProtocol(#[from] russh_sftp::client::error::Error),
}

impl DeployError {
    /// Build a failure for a remote command that exited non-zero.
    pub fn command_failed(step: impl Into<String>, exit_code: u32, stderr: &str) -> Self {
        Self::CommandFailed {
            step: step.into(),
            exit_code,
            stderr: stderr.trim().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = DeployError::command_failed("Clear release directory", 1, "rm: denied\n");
        assert_eq!(
            err.to_string(),
            "Clear release directory failed with exit code 1: rm: denied"
        );
    }

    #[test]
    fn test_archive_missing_message() {
        let err = DeployError::ArchiveMissing("./transport.tar.gz".to_string());
        assert!(err.to_string().contains("./transport.tar.gz"));
    }
}
