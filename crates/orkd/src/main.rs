//! orkd — keeps the Salt master's accepted keys in step with an
//! autoscaling group.
//!
//! Listens to the SQS queue the group publishes lifecycle notifications
//! to, accepts the key of every launched instance, and deletes the key
//! of every terminated one.
//!
//! # Usage
//!
//! ```text
//! orkd --verbose
//! orkd --daemon --syslog --config /etc/aws_ork.conf
//! ```

mod daemon;
mod logging;

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use ork_core::DEFAULT_CONFIG_PATH;
use ork_poller::RunOptions;

use crate::logging::LogTarget;

const DEFAULT_LOG_FILE: &str = "/var/log/aws_ork.log";

#[derive(Parser, Debug)]
#[command(
    name = "orkd",
    about = "Listens to an SQS queue and accepts and removes Salt minion keys",
    version
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Daemonize and log to a file.
    #[arg(short, long)]
    daemon: bool,

    /// Log to syslog rather than a file; only in daemon mode.
    #[arg(long)]
    syslog: bool,

    /// Purge all messages from the queue at startup.
    #[arg(long)]
    purge: bool,

    /// Configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log file used in daemon mode without --syslog.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

impl Cli {
    fn log_target(&self) -> LogTarget {
        match (self.daemon, self.syslog) {
            (false, _) => LogTarget::Stderr,
            (true, true) => LogTarget::Syslog,
            (true, false) => LogTarget::File(self.log_file.clone()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Open the sink before forking so a bad log path fails in the foreground.
    let sink = logging::build(&cli.log_target(), cli.verbose)?;

    if cli.daemon {
        daemon::daemonize()?;
    }

    let options = RunOptions {
        config_path: cli.config,
        purge_on_start: cli.purge,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(serve(options).with_subscriber(sink))
}

async fn serve(options: RunOptions) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "orkd starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_on_signal(shutdown_tx).with_current_subscriber());

    if let Err(e) = ork_poller::run(&options, shutdown_rx).await {
        error!(error = %e, "orkd exiting");
        return Err(e.into());
    }

    info!("orkd stopped");
    Ok(())
}

/// Flip `shutdown` on SIGINT or SIGTERM.
async fn shutdown_on_signal(shutdown: watch::Sender<bool>) {
    forward_shutdown(wait_for_signal(), shutdown).await;
}

async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "could not install SIGTERM handler");
            tokio::signal::ctrl_c().await
        }
    }
}

/// Send `true` on `shutdown` once `signal` fires.
///
/// If no handler could be installed the sender is held forever: dropping
/// it would read as a shutdown request to the poll loop.
async fn forward_shutdown<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "could not install signal handlers, running until killed");
        std::future::pending::<()>().await;
    }

    info!("shutdown signal received");
    let _ = shutdown.send(true);
}
