use console::style;

use crate::config::DeployConfig;
use crate::deploy;
use crate::error::{DeployError, Result};

pub async fn execute(config: &DeployConfig) -> Result<()> {
    println!(
        "  {} {}",
        style("◐").cyan(),
        style(format!("Connecting to {}@{}:{}...", config.user, config.host, config.port)).dim()
    );

    let client = deploy::connect(config).await?;
    let result = client.exec("true", None).await;

    if let Err(e) = client.close().await {
        tracing::warn!("Failed to close connection: {}", e);
    }

    let output = result?;
    if !output.success {
        return Err(DeployError::command_failed(
            "Remote shell check",
            output.exit_code,
            &output.stderr,
        ));
    }

    println!(
        "  {} Connected to {} and ran a command",
        style("✓").green().bold(),
        style(client.host()).white().bold()
    );

    Ok(())
}
