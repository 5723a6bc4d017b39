use console::style;

use crate::config::{DeployConfig, MissingArchivePolicy};
use crate::deploy::plan::RemoteCommand;
use crate::deploy::DeployPlan;
use crate::error::Result;

pub async fn execute(config: &DeployConfig) -> Result<()> {
    let plan = DeployPlan::build(config);

    println!("{}", style("Deployment plan").bold().cyan());
    println!();
    println!("  Target:   {}", style(&plan.target).white());
    println!("  Policy:   {:?}", config.host_key_policy);
    println!();

    print_command(1, &plan.clear);

    let archive_state = if plan.local_archive.is_file() {
        style("present").green()
    } else if plan.on_missing_archive == MissingArchivePolicy::Continue {
        style("missing, will reuse the server copy").yellow()
    } else {
        style("missing, deploy will abort").red()
    };
    println!(
        "  {} {} {} → {} ({})",
        style("2.").dim(),
        style("upload-archive").cyan(),
        plan.local_archive.display(),
        plan.remote_archive,
        archive_state
    );

    print_command(3, &plan.extract);
    for (i, command) in plan.containers.iter().enumerate() {
        print_command(4 + i, command);
    }

    println!();
    Ok(())
}

fn print_command(index: usize, command: &RemoteCommand) {
    let stdin = if command.stdin.is_some() {
        style(" (password on stdin)").dim().to_string()
    } else {
        String::new()
    };

    println!(
        "  {} {} {}{}",
        style(format!("{}.", index)).dim(),
        style(command.step).cyan(),
        command.command,
        stdin
    );
}
