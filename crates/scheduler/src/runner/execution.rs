use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Scheduler;

/// Extra time, beyond one batch timeout, that shutdown waits for in-flight groups.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

impl Scheduler {
    /// Run the scheduling loop until [`shutdown`](Self::shutdown) is called.
    ///
    /// Restores persisted statistics on start, ticks every
    /// `tick_interval_ms` (or sooner when urgent work arrives), persists
    /// statistics every `snapshot_interval_secs`, and on shutdown waits a
    /// bounded time for in-flight groups before a final persist.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        self.stats.restore().await;

        {
            let config = self.read_config();
            info!(
                tick_interval_ms = config.tick_interval_ms,
                batch_timeout_ms = config.batch_timeout_ms,
                "scheduler starting"
            );
        }

        let mut last_snapshot = Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.tick().await;

            let (tick_interval, snapshot_interval) = {
                let config = self.read_config();
                (config.tick_interval(), config.stats.snapshot_interval())
            };
            if last_snapshot.elapsed() >= snapshot_interval {
                self.stats.persist_logged().await;
                last_snapshot = Instant::now();
            }

            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {}
                _ = self.wake.notified() => debug!("woken before tick interval"),
                _ = shutdown.changed() => {}
            }
        }

        let limit = self.read_config().batch_timeout() + DRAIN_GRACE;
        if !self.drain(limit).await {
            warn!(
                active = self.active_batch_count(),
                "shutdown drain timed out with batches still in flight"
            );
        }
        self.stats.persist_logged().await;
        info!(pending = self.pending_count(), "Scheduler stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    /// Signal the loop to stop after its current tick.
    pub fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until no groups are in flight, or `limit` passes. Returns
    /// whether the scheduler went idle.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.active_batch_count() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            let _ = tokio::time::timeout(wait, self.idle.notified()).await;
        }
    }
}
