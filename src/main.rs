//! jobtrack - diff-based internship tracker
//!
//! This is the main CLI entry point for jobtrack.

use clap::{Parser, Subcommand};
use jobtrack::config::Settings;
use jobtrack::db::JobStore;
use jobtrack::debug::DebugOptions;
use jobtrack::error::Result;
use jobtrack::stack::{ComposeCommand, StackRunner};
use jobtrack::{debug, tracker, webhook};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// jobtrack - diff-based internship tracker
#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(version)]
#[command(about = "Diff-based internship tracker", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one polling cycle
    Run,

    /// Walk a diff verbosely and print every notification decision
    Debug {
        /// Process at most N reconstructed rows (0 = all)
        #[arg(long, default_value = "0")]
        max_rows: usize,
        /// Actually send Discord/Facebook notifications
        #[arg(long)]
        send: bool,
        /// Include links already present in the processed set
        #[arg(long)]
        include_processed: bool,
        /// Override old/base SHA (defaults to the stored last SHA)
        #[arg(long)]
        old_sha: Option<String>,
        /// Override new/head SHA (defaults to the latest branch SHA)
        #[arg(long)]
        new_sha: Option<String>,
    },

    /// Serve the Facebook Messenger webhook
    Webhook,

    /// Run the container stack and propagate the tracker's exit code
    Stack {
        /// Stack project directory
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Designated service whose exit code decides the outcome
        #[arg(long)]
        service: Option<String>,
        /// Skip the pre-run teardown of any existing stack state
        #[arg(long)]
        skip_pre_clean: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => {
            let settings = Settings::from_env()?;
            tracker::run_once(&settings).await?;
        }

        Commands::Debug {
            max_rows,
            send,
            include_processed,
            old_sha,
            new_sha,
        } => {
            let settings = Settings::from_env()?;
            let opts = DebugOptions {
                max_rows,
                send,
                include_processed,
                old_sha,
                new_sha,
            };
            let code = debug::run(&settings, &opts).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Webhook => {
            let settings = Settings::from_env()?;
            let store = JobStore::open(std::path::Path::new(&settings.database_path))?;
            webhook::serve(settings, store).await?;
        }

        Commands::Stack {
            project_dir,
            service,
            skip_pre_clean,
        } => {
            let dir = match project_dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let compose = ComposeCommand::detect().await;
            let mut runner = StackRunner::new(compose, dir).with_pre_clean(!skip_pre_clean);
            if let Some(service) = service {
                runner = runner.with_service(Some(service));
            }
            let code = runner.run().await?;
            std::process::exit(code);
        }
    }

    Ok(())
}
