//! Remote command execution.
//!
//! Provides non-interactive command execution with stdout/stderr capture.

use russh::client::Handle;
use russh::ChannelMsg;

use crate::error::{DeployError, Result};
use crate::ssh::client::ClientHandler;

/// Exit code reported when the server closes the channel without an exit
/// status (killed by a signal, dropped connection). Mirrors OpenSSH's 255.
pub const EXIT_CODE_UNKNOWN: u32 = 255;

/// Output from a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Remote exit status.
    pub exit_code: u32,

    /// Whether the command succeeded (exit_code == 0).
    pub success: bool,
}

impl CommandOutput {
    /// Create a new command output.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: u32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            success: exit_code == 0,
        }
    }
}

/// Execute a command on the remote host (non-interactive).
///
/// When `stdin` is given it is written to the command's standard input and
/// followed by EOF. This is how `sudo -S` receives its password without the
/// password appearing in the command line.
pub async fn exec_command(
    session: &Handle<ClientHandler>,
    command: &str,
    stdin: Option<&[u8]>,
) -> Result<CommandOutput> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| DeployError::Ssh(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(true, command.as_bytes())
        .await
        .map_err(|e| DeployError::Ssh(format!("Failed to execute command: {}", e)))?;

    if let Some(input) = stdin {
        channel
            .data(input)
            .await
            .map_err(|e| DeployError::Ssh(format!("Failed to write command input: {}", e)))?;
    }

    channel
        .eof()
        .await
        .map_err(|e| DeployError::Ssh(format!("Failed to send EOF: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    // Exit status may arrive after EOF, so drain until the channel closes.
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit_code = Some(exit_status);
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                tracing::debug!("Remote command terminated by signal {:?}", signal_name);
            }
            Some(ChannelMsg::Close) | None => {
                break;
            }
            _ => {}
        }
    }

    let stdout_str = String::from_utf8_lossy(&stdout).to_string();
    let stderr_str = String::from_utf8_lossy(&stderr).to_string();

    Ok(CommandOutput::new(
        stdout_str,
        stderr_str,
        exit_code.unwrap_or(EXIT_CODE_UNKNOWN),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput::new("hello", "", 0);
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn test_command_output_failure() {
        let output = CommandOutput::new("", "error", 1);
        assert!(!output.success);
        assert_eq!(output.stderr, "error");
    }

    #[test]
    fn test_unknown_exit_code_is_failure() {
        let output = CommandOutput::new("", "", EXIT_CODE_UNKNOWN);
        assert!(!output.success);
    }
}
