//! Mter CLI - Export console output over UDP
//!
//! A small harness around `mter-core`: run a demo process (optionally with
//! workers) whose output is exported, allocate forwarder ports by hand, and
//! check which target rules select a process name.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mter")]
#[command(author, version, about = "Export console output over UDP")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a counter through the exported stdout until interrupted
    Run {
        /// Logical process name (defaults to MTER_NAME or a derived name)
        #[arg(short, long)]
        name: Option<String>,

        /// Number of worker processes to spawn
        #[arg(short, long, default_value_t = 0)]
        workers: u32,

        /// Milliseconds between lines
        #[arg(short, long, default_value_t = 100)]
        interval_ms: u64,

        /// Stop after this many lines
        #[arg(short, long)]
        count: Option<u64>,

        /// Keep writing stdout locally while exporting
        #[arg(long)]
        keep_stdout: bool,
    },

    /// Allocate a forwarder port from the host allocation record
    Allocate,

    /// Show which target rules select a process name
    Check {
        /// Process name to test
        name: String,

        /// Rules to test instead of the MTER variable
        rules: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(mter_core::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            name,
            workers,
            interval_ms,
            count,
            keep_stdout,
        } => {
            commands::run::run(commands::run::RunOptions {
                name,
                workers,
                interval_ms,
                count,
                keep_stdout,
            })
            .await?;
        }
        Commands::Allocate => {
            commands::allocate::run(cli.json).await?;
        }
        Commands::Check { name, rules } => {
            commands::check::run(&name, rules, cli.json)?;
        }
    }

    Ok(())
}
