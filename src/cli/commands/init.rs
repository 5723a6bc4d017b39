use std::path::Path;

use console::{style, Term};
use dialoguer::{Input, Select};

use crate::config::{DeployConfig, SudoMode};
use crate::error::{DeployError, Result};

pub async fn execute(path: &Path, force: bool, defaults: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(DeployError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    let config = if defaults || !Term::stdout().is_term() {
        DeployConfig::example()
    } else {
        prompt()?
    };

    config.save(path)?;

    println!(
        "{} Wrote {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    println!(
        "Keep the password out of the file: export {} or reference it as {}.",
        style("DROPSHIP_PASSWORD").yellow(),
        style("${VAR}").yellow()
    );

    Ok(())
}

fn prompt() -> Result<DeployConfig> {
    println!("{}", style("Configure a dropship deployment").bold().cyan());
    println!();

    let example = DeployConfig::example();

    let host: String = Input::new().with_prompt("Server host").interact_text()?;

    let user: String = Input::new()
        .with_prompt("SSH user")
        .default(example.user.clone())
        .interact_text()?;

    let home = format!("/home/{}", user);

    let local_archive: String = Input::new()
        .with_prompt("Local archive")
        .default(example.local_archive.clone())
        .interact_text()?;

    let remote_archive: String = Input::new()
        .with_prompt("Remote archive path")
        .default(format!("{}/release/transport.tar.gz", home))
        .interact_text()?;

    let release_dir: String = Input::new()
        .with_prompt("Release directory (wiped on every deploy)")
        .default(format!("{}/release/app_release", home))
        .interact_text()?;

    let images: String = Input::new()
        .with_prompt("Image archives, comma separated")
        .default(example.images.join(","))
        .interact_text()?;

    let compose_dir: String = Input::new()
        .with_prompt("docker compose directory")
        .default(format!("{}/release", home))
        .interact_text()?;

    let sudo_modes = ["password (sudo -S)", "passwordless (sudo -n)", "none"];
    let sudo = match Select::new()
        .with_prompt("How should docker commands get root?")
        .items(&sudo_modes)
        .default(0)
        .interact()?
    {
        1 => SudoMode::Passwordless,
        2 => SudoMode::None,
        _ => SudoMode::Password,
    };

    Ok(DeployConfig {
        host,
        user,
        password: None,
        local_archive,
        remote_archive,
        images_dir: release_dir.clone(),
        release_dir,
        images: images
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        compose_dir,
        sudo,
        ..example
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_writes_example_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropship.yaml");

        execute(&path, false, true).await.unwrap();

        let written = DeployConfig::from_yaml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.images, DeployConfig::example().images);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropship.yaml");
        std::fs::write(&path, "host: keep-me\n").unwrap();

        let err = execute(&path, false, true).await.unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "host: keep-me\n");

        execute(&path, true, true).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("images:"));
    }
}
