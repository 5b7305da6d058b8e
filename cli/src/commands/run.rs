//! Run command - a demo process whose output is exported.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use mter_core::domain::WORKER_ID_ENV;
use mter_core::{MterConfig, MterEngine, MterSession, ProcessIdentity};
use tokio::process::{Child, Command};
use tokio::signal;
use tracing::{info, warn};

/// How long a worker gets to exit on its own before it is killed.
const WORKER_EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct RunOptions {
    pub name: Option<String>,
    pub workers: u32,
    pub interval_ms: u64,
    pub count: Option<u64>,
    pub keep_stdout: bool,
}

pub async fn run(opts: RunOptions) -> Result<()> {
    let config = export_config(std::env::vars(), opts.keep_stdout);
    let name = opts
        .name
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.process_name.clone()));
    let identity = ProcessIdentity::current(name.as_deref());

    let session = match config {
        Some(config) => activate(config, identity.clone()).await,
        None => None,
    };
    let result = match spawn_workers(&opts) {
        Ok(mut workers) => {
            let result = tick(&opts, &identity).await;
            for worker in &mut workers {
                stop_worker(worker).await;
            }
            result
        }
        Err(e) => Err(e),
    };

    // Farewell on every exit path, including write errors.
    if let Some(session) = session {
        session.shutdown().await;
    }
    result
}

/// Export configuration, or `None` when it is invalid.
///
/// A bad `MTER_*` value disables export but never stops the process.
fn export_config<I, K, V>(vars: I, keep_stdout: bool) -> Option<MterConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    match MterConfig::from_vars(vars) {
        Ok(mut config) => {
            if keep_stdout {
                config.keep_local_output = true;
            }
            Some(config)
        }
        Err(e) => {
            warn!(error = %e, "Invalid export configuration, console export disabled");
            None
        }
    }
}

/// Print numbered lines until the count is reached or a signal arrives.
async fn tick(opts: &RunOptions, identity: &ProcessIdentity) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(opts.interval_ms.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut counter: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // One write per line, so one datagram per line.
                let line = format!("{} {} {}\n", identity.name, identity.pid, counter);
                mter_core::stdout().write_all(line.as_bytes())?;
                counter += 1;
                if opts.count.is_some_and(|max| counter >= max) {
                    return Ok(());
                }
            }
            () = &mut shutdown => return Ok(()),
        }
    }
}

async fn activate(config: MterConfig, identity: ProcessIdentity) -> Option<MterSession> {
    let engine = MterEngine::new(config, identity);
    match engine.activate().await {
        Ok(Some(session)) => {
            info!(
                name = %engine.identity().name,
                port = session.port(),
                rule = %session.rule(),
                "Console export active"
            );
            Some(session)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Console export disabled");
            None
        }
    }
}

fn spawn_workers(opts: &RunOptions) -> Result<Vec<Child>> {
    if opts.workers == 0 {
        return Ok(Vec::new());
    }
    let exe = std::env::current_exe().context("Failed to locate the mter executable")?;

    (0..opts.workers)
        .map(|id| {
            let mut command = Command::new(&exe);
            command
                .arg("run")
                .arg("--interval-ms")
                .arg(opts.interval_ms.to_string())
                .env(WORKER_ID_ENV, id.to_string())
                .kill_on_drop(true);
            if let Some(count) = opts.count {
                command.arg("--count").arg(count.to_string());
            }
            if opts.keep_stdout {
                command.arg("--keep-stdout");
            }
            command
                .spawn()
                .with_context(|| format!("Failed to spawn worker {}", id))
        })
        .collect()
}

async fn stop_worker(worker: &mut Child) {
    if tokio::time::timeout(WORKER_EXIT_GRACE, worker.wait())
        .await
        .is_err()
    {
        let _ = worker.kill().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
