//! Remote command planning.
//!
//! Turns a [`DeployConfig`] into the exact command lines the deployer will
//! send. Nothing here touches the network, so `dropship plan` and the tests
//! can inspect a deployment before it runs.

use std::fmt;
use std::path::PathBuf;

use crate::config::{DeployConfig, MissingArchivePolicy, Secret, SudoMode};
use crate::utils::shell_quote;

/// A stage of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ClearReleaseDir,
    ExtractArchive,
    LoadImage,
    ComposeDown,
    ComposeUp,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::ClearReleaseDir => "clear-release-dir",
            Step::ExtractArchive => "extract-archive",
            Step::LoadImage => "load-image",
            Step::ComposeDown => "compose-down",
            Step::ComposeUp => "compose-up",
        };
        f.write_str(name)
    }
}

/// A single command line to run on the server.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    pub step: Step,
    pub label: String,
    pub command: String,
    /// Written to the command's stdin (the sudo password), never part of `command`.
    pub stdin: Option<Secret>,
}

impl RemoteCommand {
    fn new(step: Step, label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            step,
            label: label.into(),
            command: command.into(),
            stdin: None,
        }
    }

    /// Bytes for the remote stdin, newline-terminated as `sudo -S` expects.
    pub fn stdin_bytes(&self) -> Option<Vec<u8>> {
        self.stdin
            .as_ref()
            .map(|secret| format!("{}\n", secret.expose()).into_bytes())
    }
}

/// Every remote action of one deployment, in execution order.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub target: String,
    pub local_archive: PathBuf,
    pub remote_archive: String,
    pub release_dir: String,
    pub on_missing_archive: MissingArchivePolicy,
    pub clear: RemoteCommand,
    pub extract: RemoteCommand,
    /// Run with `&&` semantics: the first failure ends the chain.
    pub containers: Vec<RemoteCommand>,
}

impl DeployPlan {
    pub fn build(config: &DeployConfig) -> Self {
        let release_dir = config.release_dir().to_string();
        let extract_dir = config.extract_dir();

        let clear = RemoteCommand::new(
            Step::ClearReleaseDir,
            "Clear release directory",
            format!("rm -rf -- {}/*", shell_quote(&release_dir)),
        );

        let extract = RemoteCommand::new(
            Step::ExtractArchive,
            "Archive extract",
            format!(
                "cd {} && tar xzvf {}",
                shell_quote(&extract_dir),
                shell_quote(&config.remote_archive)
            ),
        );

        let elevation = Elevation::from_config(config);
        let mut containers = Vec::with_capacity(config.images.len() + 2);

        for image in &config.images {
            containers.push(elevation.wrap(RemoteCommand::new(
                Step::LoadImage,
                format!("Load image {}", image),
                format!(
                    "cd {} && {}docker load -i {}",
                    shell_quote(&config.images_dir),
                    elevation.prefix(),
                    shell_quote(image)
                ),
            )));
        }

        for (step, label, args) in [
            (Step::ComposeDown, "Compose down", "down"),
            (Step::ComposeUp, "Compose up", "up -d"),
        ] {
            containers.push(elevation.wrap(RemoteCommand::new(
                step,
                label,
                format!(
                    "cd {} && {}docker compose {}",
                    shell_quote(&config.compose_dir),
                    elevation.prefix(),
                    args
                ),
            )));
        }

        Self {
            target: format!("{}@{}:{}", config.user, config.host, config.port),
            local_archive: config.local_archive_path(),
            remote_archive: config.remote_archive.clone(),
            release_dir,
            on_missing_archive: config.on_missing_archive,
            clear,
            extract,
            containers,
        }
    }

    /// All remote commands in the order they run.
    pub fn commands(&self) -> impl Iterator<Item = &RemoteCommand> {
        std::iter::once(&self.clear)
            .chain(std::iter::once(&self.extract))
            .chain(self.containers.iter())
    }
}

struct Elevation {
    mode: SudoMode,
    password: Option<Secret>,
}

impl Elevation {
    fn from_config(config: &DeployConfig) -> Self {
        Self {
            mode: config.sudo,
            password: config.sudo_password().cloned(),
        }
    }

    fn prefix(&self) -> &'static str {
        match self.mode {
            // Empty prompt keeps "[sudo] password for ..." out of stderr
            SudoMode::Password => "sudo -S -p '' ",
            SudoMode::Passwordless => "sudo -n ",
            SudoMode::None => "",
        }
    }

    fn wrap(&self, mut command: RemoteCommand) -> RemoteCommand {
        if self.mode == SudoMode::Password {
            command.stdin = self.password.clone();
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        DeployConfig {
            host: "10.17.1.216".to_string(),
            user: "sa".to_string(),
            password: Some(Secret::new("asd555")),
            remote_archive: "/home/sa/release/transport.tar.gz".to_string(),
            release_dir: "/home/sa/release/petitions_release".to_string(),
            images_dir: "/home/sa/petitions_release".to_string(),
            images: vec![
                "frontend_petition.tar".to_string(),
                "backend_petition.tar".to_string(),
            ],
            compose_dir: "/home/sa".to_string(),
            ..DeployConfig::example()
        }
    }

    #[test]
    fn test_clear_targets_configured_dir() {
        let plan = DeployPlan::build(&config());
        assert_eq!(plan.clear.step, Step::ClearReleaseDir);
        assert_eq!(
            plan.clear.command,
            "rm -rf -- '/home/sa/release/petitions_release'/*"
        );
        assert!(plan.clear.stdin.is_none());
    }

    #[test]
    fn test_clear_ignores_trailing_slash() {
        let config = DeployConfig {
            release_dir: "/home/sa/release/petitions_release//".to_string(),
            ..config()
        };
        let plan = DeployPlan::build(&config);
        assert_eq!(
            plan.clear.command,
            "rm -rf -- '/home/sa/release/petitions_release'/*"
        );
    }

    #[test]
    fn test_extract_command() {
        let plan = DeployPlan::build(&config());
        assert_eq!(
            plan.extract.command,
            "cd '/home/sa/release' && tar xzvf '/home/sa/release/transport.tar.gz'"
        );
    }

    #[test]
    fn test_container_chain_order() {
        let plan = DeployPlan::build(&config());
        let steps: Vec<Step> = plan.containers.iter().map(|c| c.step).collect();
        assert_eq!(
            steps,
            vec![
                Step::LoadImage,
                Step::LoadImage,
                Step::ComposeDown,
                Step::ComposeUp
            ]
        );
        assert_eq!(
            plan.containers[0].command,
            "cd '/home/sa/petitions_release' && sudo -S -p '' docker load -i 'frontend_petition.tar'"
        );
        assert_eq!(
            plan.containers[3].command,
            "cd '/home/sa' && sudo -S -p '' docker compose up -d"
        );
    }

    #[test]
    fn test_password_never_in_command_text() {
        let plan = DeployPlan::build(&config());
        for command in plan.commands() {
            assert!(!command.command.contains("asd555"), "{}", command.command);
        }
        assert_eq!(
            plan.containers[0].stdin_bytes(),
            Some(b"asd555\n".to_vec())
        );
    }

    #[test]
    fn test_passwordless_sudo() {
        let config = DeployConfig {
            sudo: SudoMode::Passwordless,
            ..config()
        };
        let plan = DeployPlan::build(&config);
        assert!(plan.containers.iter().all(|c| c.stdin.is_none()));
        assert!(plan.containers[2].command.ends_with("sudo -n docker compose down"));
    }

    #[test]
    fn test_no_sudo() {
        let config = DeployConfig {
            sudo: SudoMode::None,
            ..config()
        };
        let plan = DeployPlan::build(&config);
        assert_eq!(
            plan.containers[2].command,
            "cd '/home/sa' && docker compose down"
        );
    }

    #[test]
    fn test_commands_order() {
        let plan = DeployPlan::build(&config());
        let steps: Vec<Step> = plan.commands().map(|c| c.step).collect();
        assert_eq!(steps[0], Step::ClearReleaseDir);
        assert_eq!(steps[1], Step::ExtractArchive);
        assert_eq!(steps.len(), 6);
    }

    #[test]
    fn test_target() {
        let plan = DeployPlan::build(&config());
        assert_eq!(plan.target, "sa@10.17.1.216:22");
    }
}
