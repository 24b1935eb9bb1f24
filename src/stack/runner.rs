//! Stack lifecycle runner

use super::command::ComposeCommand;
use crate::error::{Result, TrackerError};
use std::path::PathBuf;
use std::process::ExitStatus;

/// Default designated service whose exit code decides the run outcome.
pub const DEFAULT_SERVICE: &str = "job-tracker";

/// Brings the stack up, waits for the designated service to exit,
/// captures its exit code, and guarantees teardown on every path.
pub struct StackRunner {
    compose: ComposeCommand,
    project_dir: PathBuf,
    service: Option<String>,
    pre_clean: bool,
}

impl StackRunner {
    /// Create a runner for `project_dir` with the default designated
    /// service. Pre-run cleanup is enabled by default so stale stack
    /// state from an aborted earlier run cannot leak into this one.
    pub fn new(compose: ComposeCommand, project_dir: PathBuf) -> Self {
        Self {
            compose,
            project_dir,
            service: Some(DEFAULT_SERVICE.to_string()),
            pre_clean: true,
        }
    }

    /// Override the designated service, or clear it to fall back to
    /// abort-on-container-exit semantics.
    pub fn with_service(mut self, service: Option<String>) -> Self {
        self.service = service;
        self
    }

    /// Enable or disable the best-effort teardown that runs before `up`.
    pub fn with_pre_clean(mut self, pre_clean: bool) -> Self {
        self.pre_clean = pre_clean;
        self
    }

    /// Run the full lifecycle: pre-clean (unless disabled), up,
    /// guaranteed teardown.
    ///
    /// Returns the designated service's exit code. Teardown always runs
    /// after the up attempt, whether it succeeded or not, and its own
    /// failures are suppressed.
    pub async fn run(&self) -> Result<i32> {
        if self.pre_clean {
            self.teardown("pre-run cleanup").await;
        }

        let outcome = self.up().await;
        self.teardown("teardown").await;

        let code = outcome?;
        if code == 0 {
            tracing::info!("Stack run completed cleanly.");
        } else {
            tracing::warn!("Stack run finished with exit code {}.", code);
        }
        Ok(code)
    }

    /// Build and start the stack attached, waiting for the designated
    /// service (or the first container) to exit.
    async fn up(&self) -> Result<i32> {
        let mut cmd = self.compose.command();
        cmd.current_dir(&self.project_dir);
        cmd.args(["up", "--build"]);
        match &self.service {
            Some(service) => {
                cmd.args(["--exit-code-from", service]);
            }
            None => {
                cmd.arg("--abort-on-container-exit");
            }
        }

        tracing::info!(
            "Starting stack in {} via '{}'.",
            self.project_dir.display(),
            self.compose.describe()
        );
        let status = cmd.status().await.map_err(|e| {
            TrackerError::Stack(format!(
                "failed to invoke '{}': {}",
                self.compose.describe(),
                e
            ))
        })?;
        Ok(exit_code(status))
    }

    /// Best-effort `down --remove-orphans`; failures are logged and suppressed.
    async fn teardown(&self, label: &str) {
        let mut cmd = self.compose.command();
        cmd.current_dir(&self.project_dir);
        cmd.args(["down", "--remove-orphans"]);

        match cmd.status().await {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::warn!("Stack {} exited with {}.", label, exit_code(status));
            }
            Err(e) => {
                tracing::warn!("Stack {} failed: {}.", label, e);
            }
        }
    }
}

/// Map an exit status to a propagatable code; termination by signal
/// counts as failure.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
