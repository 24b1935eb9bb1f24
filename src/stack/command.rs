//! Orchestration command resolver

use tokio::process::Command;

/// A resolved container-orchestration invocation form.
///
/// Two equivalent forms exist on hosts: the `docker compose` plugin and
/// the standalone `docker-compose` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    program: String,
    prefix: Vec<String>,
}

impl ComposeCommand {
    /// The `docker compose` plugin form.
    pub fn plugin() -> Self {
        Self {
            program: "docker".to_string(),
            prefix: vec!["compose".to_string()],
        }
    }

    /// The standalone `docker-compose` binary form.
    pub fn standalone() -> Self {
        Self {
            program: "docker-compose".to_string(),
            prefix: Vec::new(),
        }
    }

    /// An arbitrary program standing in for the orchestration tool.
    pub fn custom(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    /// Detect which invocation form is available on the host.
    ///
    /// Picks the plugin form when a `docker` binary exists and
    /// `docker compose version` succeeds; otherwise falls back to
    /// `docker-compose` unconditionally. If neither form exists the
    /// failure surfaces when the command is actually invoked.
    pub async fn detect() -> Self {
        if which::which("docker").is_ok() {
            let probe = Command::new("docker")
                .args(["compose", "version"])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await;
            if matches!(probe, Ok(status) if status.success()) {
                tracing::debug!("Using 'docker compose' plugin form.");
                return Self::plugin();
            }
        }

        tracing::debug!("Falling back to standalone 'docker-compose'.");
        Self::standalone()
    }

    /// Build a process command with the resolved program and prefix.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix);
        cmd
    }

    /// Human-readable invocation form for logs and errors.
    pub fn describe(&self) -> String {
        if self.prefix.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.prefix.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_form() {
        let compose = ComposeCommand::plugin();
        assert_eq!(compose.describe(), "docker compose");
        assert_eq!(compose.command().as_std().get_program(), "docker");
    }

    #[test]
    fn test_standalone_form() {
        let compose = ComposeCommand::standalone();
        assert_eq!(compose.describe(), "docker-compose");
        assert_eq!(compose.command().as_std().get_program(), "docker-compose");
    }

    #[test]
    fn test_command_carries_prefix_args() {
        let compose = ComposeCommand::plugin();
        let cmd = compose.command();
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, vec!["compose"]);
    }
}
