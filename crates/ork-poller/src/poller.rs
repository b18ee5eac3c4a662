//! The poll loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ork_backup::{Backup, BackupTarget, S3Sync};
use ork_core::{DEFAULT_CONFIG_PATH, OrkConfig, parse_message};
use ork_keys::{KeyState, KeyStore, PkiKeyStore};
use ork_queue::{LONG_POLL_WAIT, MAX_BATCH, MessageQueue, RawMessage, SqsQueue};

use crate::dispatcher::Dispatcher;
use crate::error::{PollerError, PollerResult};

/// First wait after a failed receive; doubles per consecutive failure.
const RECEIVE_RETRY_BASE: Duration = Duration::from_secs(1);
const RECEIVE_RETRY_MAX: Duration = Duration::from_secs(60);

/// Wait before the next receive after `failures` consecutive receive errors.
pub fn receive_backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    RECEIVE_RETRY_BASE.saturating_mul(factor).min(RECEIVE_RETRY_MAX)
}

/// Startup options for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Purge the queue before the first poll.
    pub purge_on_start: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            purge_on_start: false,
        }
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub deleted: usize,
    pub retained: usize,
    /// At least one key was accepted or deleted.
    pub mutated: bool,
    /// A backup sync ran and succeeded.
    pub backed_up: bool,
}

struct BackupPlan {
    backup: Arc<dyn Backup>,
    target: BackupTarget,
}

/// Drives receive → dispatch → backup cycles against one queue.
pub struct Poller {
    queue: Arc<dyn MessageQueue>,
    dispatcher: Dispatcher,
    backup: Option<BackupPlan>,
    pause: Duration,
}

impl Poller {
    pub fn new(queue: Arc<dyn MessageQueue>, keys: Arc<dyn KeyStore>, config: &OrkConfig) -> Self {
        Self {
            queue,
            dispatcher: Dispatcher::new(keys, config.delete_unknown_messages),
            backup: None,
            pause: config.poll_pause(),
        }
    }

    /// Mirror the trust store to `target` after every cycle that changed a key.
    pub fn with_backup(mut self, backup: Arc<dyn Backup>, target: BackupTarget) -> Self {
        self.backup = Some(BackupPlan { backup, target });
        self
    }

    /// Drop everything currently in the queue.
    pub async fn purge(&self) -> PollerResult<()> {
        self.queue.purge().await?;
        info!("purged queue");
        Ok(())
    }

    /// Run a single receive → dispatch → backup cycle.
    ///
    /// A failed receive is logged and reported as an empty cycle.
    pub async fn poll_once(&self) -> CycleReport {
        let messages = self.receive_batch().await.unwrap_or_default();
        self.process_batch(messages).await
    }

    /// Loop until `shutdown` flips (or its sender goes away).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(pause_secs = self.pause.as_secs(), "poll loop started");
        let mut failures: u32 = 0;

        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                batch = self.receive_batch() => batch,
            };

            let Some(messages) = batch else {
                failures = failures.saturating_add(1);
                let wait = receive_backoff(failures).max(self.pause);
                warn!(failures, retry_in_secs = wait.as_secs(), "receive failed, backing off");
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                continue;
            };
            if failures > 0 {
                info!(failures, "receive recovered");
                failures = 0;
            }

            let report = self.process_batch(messages).await;
            if report.received > 0 {
                debug!(
                    received = report.received,
                    deleted = report.deleted,
                    retained = report.retained,
                    mutated = report.mutated,
                    "cycle complete"
                );
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.pause) => {}
            }
        }

        info!("poll loop stopped");
    }

    /// `None` when the receive failed.
    async fn receive_batch(&self) -> Option<Vec<RawMessage>> {
        match self.queue.receive(MAX_BATCH, LONG_POLL_WAIT).await {
            Ok(messages) => Some(messages),
            Err(e) => {
                error!(error = %e, "failed to receive messages");
                None
            }
        }
    }

    async fn process_batch(&self, messages: Vec<RawMessage>) -> CycleReport {
        let mut report = CycleReport {
            received: messages.len(),
            ..CycleReport::default()
        };

        for message in &messages {
            debug!(
                message_id = message.message_id.as_deref().unwrap_or("unknown"),
                "received message"
            );

            let event = parse_message(&message.body);
            let outcome = self
                .dispatcher
                .dispatch(self.queue.as_ref(), &event, message)
                .await;

            if outcome.deleted {
                report.deleted += 1;
            } else {
                report.retained += 1;
            }
            report.mutated |= outcome.mutated;
        }

        if report.mutated {
            report.backed_up = self.backup().await;
        }

        report
    }

    /// Returns whether a sync ran and succeeded. Failures are only logged.
    async fn backup(&self) -> bool {
        let Some(plan) = &self.backup else {
            return false;
        };

        match plan.backup.sync(&plan.target).await {
            Ok(()) => true,
            Err(e) => {
                error!(url = %plan.target.url, error = %e, "error syncing pki to S3");
                false
            }
        }
    }
}

/// Load config, connect to SQS, and poll until `shutdown`.
///
/// Returns [`PollerError::Connect`] when the queue cannot be reached.
pub async fn run(options: &RunOptions, shutdown: watch::Receiver<bool>) -> PollerResult<()> {
    let config = OrkConfig::load(&options.config_path);
    run_with(
        config,
        options.purge_on_start,
        |region, queue_name| async move {
            SqsQueue::connect(&region, &queue_name)
                .await
                .map(|queue| Arc::new(queue) as Arc<dyn MessageQueue>)
        },
        shutdown,
    )
    .await
}

/// [`run`] with an already loaded config and a custom queue connector.
///
/// `connect` receives the region and queue name and yields `None` when
/// the queue is unreachable.
pub async fn run_with<F, Fut>(
    config: OrkConfig,
    purge_on_start: bool,
    connect: F,
    shutdown: watch::Receiver<bool>,
) -> PollerResult<()>
where
    F: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Option<Arc<dyn MessageQueue>>>,
{
    debug!(config = ?config, "using config");

    let queue = connect(config.sqs_region.clone(), config.queue_name.clone())
        .await
        .ok_or_else(|| PollerError::Connect {
            region: config.sqs_region.clone(),
            queue: config.queue_name.clone(),
        })?;
    info!(queue = %config.queue_name, region = %config.sqs_region, "connected to queue");

    let keys = Arc::new(PkiKeyStore::new(&config.pki_dir));
    let pki = keys.master_dir().display();
    match keys.list(KeyState::Pending) {
        Ok(pending) => info!(%pki, pending = pending.len(), "key store ready"),
        Err(e) => warn!(%pki, error = %e, "cannot read pending keys"),
    }
    let mut poller = Poller::new(queue, keys, &config);
    if let Some(target) = config.backup_target() {
        info!(url = %target.url, "pki backup enabled");
        poller = poller.with_backup(Arc::new(S3Sync::new(&config.pki_dir)), target);
    }

    if purge_on_start {
        poller.purge().await?;
    }

    poller.run(shutdown).await;
    Ok(())
}
