use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::engine::NotificationEngine;

/// Background loop that sweeps due notifications.
///
/// A sweep runs on every tick and whenever a task is enqueued. All state lives
/// in the database, so a restarted process resumes where the last one left off.
pub struct DispatchWorker {
    engine: NotificationEngine,
    interval: Duration,
}

impl DispatchWorker {
    pub fn new(engine: NotificationEngine) -> Self {
        let interval = engine.config().sweep_interval();
        Self { engine, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let wakeup = self.engine.wakeup();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            worker = %self.engine.worker_id(),
            interval = ?self.interval,
            "notification dispatch worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wakeup.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.drain(&shutdown).await;
        }

        info!(worker = %self.engine.worker_id(), "notification dispatch worker stopped");
    }

    /// Sweeps back to back while each sweep fills a whole batch and makes
    /// progress, so a backlog does not wait a tick per batch.
    async fn drain(&self, shutdown: &watch::Receiver<bool>) {
        let batch_size = self.engine.config().batch_size as usize;
        loop {
            match self.engine.dispatch_due().await {
                Ok(report) => {
                    let progressed = report.sent + report.retry_scheduled + report.exhausted;
                    if report.examined < batch_size || progressed == 0 || *shutdown.borrow() {
                        return;
                    }
                    debug!(examined = report.examined, "batch full, sweeping again");
                }
                Err(e) => {
                    error!("notification sweep failed: {}", e);
                    return;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
