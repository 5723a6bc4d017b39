//! The deployment workflow.
//!
//! Clear the release directory, upload the archive, extract it, then run the
//! container chain. Every remote command's exit status is checked; a failure
//! stops the run unless `keep_going` is set.

use std::time::Instant;

use crate::config::MissingArchivePolicy;
use crate::deploy::plan::{DeployPlan, RemoteCommand, Step};
use crate::deploy::remote::RemoteHost;
use crate::deploy::report::Reporter;
use crate::error::{DeployError, Result};
use crate::ssh::CommandOutput;
use crate::utils::format_bytes;

/// Switches that change how failures are handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Continue with the next step after a failed one.
    pub keep_going: bool,
    /// Treat a missing local archive as `on_missing_archive: continue`.
    pub allow_missing_archive: bool,
}

/// What a finished run did.
#[derive(Debug, Clone, Default)]
pub struct DeploySummary {
    /// Steps whose remote command ran, in order.
    pub executed: Vec<Step>,
    /// Bytes uploaded, `None` when the upload was skipped.
    pub uploaded_bytes: Option<u64>,
    /// Messages of the steps that failed under `keep_going`.
    pub failures: Vec<String>,
    pub elapsed: std::time::Duration,
}

/// Run the workflow on an already connected host, then close it.
///
/// The host is closed on every path, including failures, and exactly once.
pub async fn run_session<R>(
    remote: &R,
    plan: &DeployPlan,
    options: DeployOptions,
    reporter: &mut dyn Reporter,
) -> Result<DeploySummary>
where
    R: RemoteHost + ?Sized,
{
    reporter.info(&format!("Connected to {}", plan.target));

    let result = Deployer::new(remote, plan, options, reporter).run().await;

    match remote.close().await {
        Ok(()) => reporter.info(&format!("Connection to {} closed", plan.target)),
        Err(e) => {
            tracing::warn!("Failed to close connection: {}", e);
            reporter.warn(&format!("Failed to close connection cleanly: {}", e));
        }
    }

    result
}

/// Drives one deployment against a [`RemoteHost`].
pub struct Deployer<'a, R: RemoteHost + ?Sized> {
    remote: &'a R,
    plan: &'a DeployPlan,
    options: DeployOptions,
    reporter: &'a mut dyn Reporter,
    summary: DeploySummary,
}

impl<'a, R: RemoteHost + ?Sized> Deployer<'a, R> {
    pub fn new(
        remote: &'a R,
        plan: &'a DeployPlan,
        options: DeployOptions,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            remote,
            plan,
            options,
            reporter,
            summary: DeploySummary::default(),
        }
    }

    pub async fn run(mut self) -> Result<DeploySummary> {
        let started = Instant::now();

        if let Err(e) = self.clear_release_dir().await {
            self.record_failure(e)?;
        }
        if let Err(e) = self.upload_archive().await {
            self.record_failure(e)?;
        }
        if let Err(e) = self.extract_archive().await {
            self.record_failure(e)?;
        }
        if let Err(e) = self.deploy_containers().await {
            self.record_failure(e)?;
        }

        self.summary.elapsed = started.elapsed();

        if self.summary.failures.is_empty() {
            Ok(self.summary)
        } else {
            Err(DeployError::StepsFailed {
                count: self.summary.failures.len(),
                steps: self.summary.failures.join("; "),
            })
        }
    }

    /// Report a failed step; swallow it under `keep_going` when the session
    /// is still usable.
    fn record_failure(&mut self, error: DeployError) -> Result<()> {
        self.reporter.error(&error.to_string());

        let recoverable = matches!(
            error,
            DeployError::CommandFailed { .. }
                | DeployError::Timeout { .. }
                | DeployError::Sftp(_)
                | DeployError::SftpProtocol(_)
        );

        if self.options.keep_going && recoverable {
            self.summary.failures.push(error.to_string());
            Ok(())
        } else {
            Err(error)
        }
    }

    async fn exec(&mut self, command: &RemoteCommand) -> Result<CommandOutput> {
        let output = self.remote.exec(command).await?;
        self.summary.executed.push(command.step);
        tracing::debug!(
            "[{}] exit code {} ({} bytes stdout, {} bytes stderr)",
            command.step,
            output.exit_code,
            output.stdout.len(),
            output.stderr.len()
        );
        Ok(output)
    }

    async fn clear_release_dir(&mut self) -> Result<()> {
        let plan = self.plan;
        let command = &plan.clear;
        let output = self.exec(command).await?;

        if !output.success {
            return Err(DeployError::command_failed(
                &command.label,
                output.exit_code,
                &output.stderr,
            ));
        }

        self.reporter
            .info(&format!("Cleared contents of {}", plan.release_dir));
        Ok(())
    }

    async fn upload_archive(&mut self) -> Result<()> {
        let plan = self.plan;
        let local = &plan.local_archive;

        if !local.is_file() {
            let policy = if self.options.allow_missing_archive {
                MissingArchivePolicy::Continue
            } else {
                plan.on_missing_archive
            };

            // The abort path is reported by `record_failure`
            return match policy {
                MissingArchivePolicy::Abort => {
                    Err(DeployError::ArchiveMissing(local.display().to_string()))
                }
                MissingArchivePolicy::Continue => {
                    self.reporter
                        .error(&format!("Local archive not found: {}", local.display()));
                    self.reporter.warn(&format!(
                        "Skipping upload, extracting the {} already on the server",
                        plan.remote_archive
                    ));
                    Ok(())
                }
            };
        }

        let progress = self.reporter.upload_progress();
        let result = self
            .remote
            .upload(local, &plan.remote_archive, &progress)
            .await;
        progress.finish_and_clear();

        let bytes = result?;
        self.summary.uploaded_bytes = Some(bytes);
        self.reporter.info(&format!(
            "Uploaded {} to {} ({})",
            local.display(),
            plan.remote_archive,
            format_bytes(bytes)
        ));
        Ok(())
    }

    async fn extract_archive(&mut self) -> Result<()> {
        let plan = self.plan;
        let command = &plan.extract;
        let output = self.exec(command).await?;

        self.report_output(&command.label, &output.stdout, &output.stderr);

        if !output.success {
            return Err(DeployError::command_failed(
                &command.label,
                output.exit_code,
                &output.stderr,
            ));
        }
        Ok(())
    }

    /// Run the container chain. Output is collected across links and reported
    /// once, after the chain ends.
    async fn deploy_containers(&mut self) -> Result<()> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut failure = None;

        let plan = self.plan;
        for command in &plan.containers {
            let output = match self.exec(command).await {
                Ok(output) => output,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            stdout.push_str(&output.stdout);
            stderr.push_str(&output.stderr);

            if !output.success {
                failure = Some(DeployError::command_failed(
                    &command.label,
                    output.exit_code,
                    &output.stderr,
                ));
                break;
            }
        }

        self.report_output("Container deploy", &stdout, &stderr);

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn report_output(&mut self, label: &str, stdout: &str, stderr: &str) {
        self.reporter.info(&format!("{} output:", label));
        self.reporter.output(stdout);

        if !stderr.trim().is_empty() {
            self.reporter.error(&format!("{} errors:", label));
            self.reporter.output(stderr);
        }
    }
}
