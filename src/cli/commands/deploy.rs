use console::{style, Term};
use dialoguer::Confirm;

use crate::config::DeployConfig;
use crate::deploy::{self, ConsoleReporter, DeployOptions};
use crate::error::{DeployError, Result};
use crate::utils::format_bytes;

const BANNER: &str = r#"
╔═══════════════════════════════╗
║  d r o p s h i p              ║
║  release over ssh             ║
╚═══════════════════════════════╝
"#;

pub fn print_banner() {
    println!("{}", style(BANNER).cyan());
}

pub async fn execute(config: &DeployConfig, options: DeployOptions, yes: bool) -> Result<()> {
    print_banner();
    println!(
        "  {} {} {}",
        style("→").bold(),
        style(format!("{}@{}", config.user, config.host)).white().bold(),
        style(format!("(port {})", config.port)).dim()
    );
    println!();

    if !yes {
        if !Term::stdout().is_term() {
            return Err(DeployError::Aborted(format!(
                "refusing to wipe {} without confirmation; pass --yes",
                config.release_dir()
            )));
        }

        let confirmed = Confirm::new()
            .with_prompt(format!(
                "  {} Delete everything in {} and redeploy?",
                style("?").cyan().bold(),
                config.release_dir()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!();
            println!("  {}", style("Cancelled.").dim());
            return Ok(());
        }
        println!();
    }

    let mut reporter = ConsoleReporter::new();
    let summary = deploy::run(config, options, &mut reporter).await?;

    println!();
    println!(
        "  {} Deployed in {:.1}s, {} remote commands{}",
        style("✓").green().bold(),
        summary.elapsed.as_secs_f64(),
        summary.executed.len(),
        summary
            .uploaded_bytes
            .map(|b| format!(", {} uploaded", format_bytes(b)))
            .unwrap_or_default()
    );

    Ok(())
}
