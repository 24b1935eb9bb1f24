//! Zero-argument stack runner.
//!
//! Clears any stale stack state, brings the docker compose stack up from
//! the current directory, waits for the tracker service to exit, always
//! tears the stack down, and exits with the tracker's exit code.

use jobtrack::stack::{ComposeCommand, StackRunner};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let project_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!("Failed to resolve current directory: {}", e);
            std::process::exit(1);
        }
    };

    let compose = ComposeCommand::detect().await;
    tracing::info!("Using compose command: {}", compose.describe());

    let runner = StackRunner::new(compose, project_dir);
    match runner.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("Stack run failed: {}", e);
            std::process::exit(1);
        }
    }
}
