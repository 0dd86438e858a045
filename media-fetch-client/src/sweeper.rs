use crate::cache::SharedResultCache;
use crate::in_flight::SharedInFlightGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Background task that periodically sweeps the cache and the in-flight guard
pub struct Sweeper {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping every `period`. Must be called within a tokio runtime.
    pub fn spawn(cache: SharedResultCache, guard: SharedInFlightGuard, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let period = period.clamp(Duration::from_millis(1), MAX_PERIOD);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = cache.sweep();
                        let purged = guard.purge_expired();
                        if report.expired + report.trimmed + purged > 0 {
                            log::info!(
                                "Sweep removed {} expired and {} excess cache entries, {} stale markers",
                                report.expired,
                                report.trimmed,
                                purged
                            );
                        }
                    }
                    _ = signal.notified() => break,
                }
            }
            log::debug!("Sweeper stopped");
        });

        log::info!("Started cache sweeper (every {:?})", period);
        Self { shutdown, handle }
    }

    /// Stop the task and wait for it to exit
    pub async fn stop(self) {
        // notify_one stores a permit, so a sweep in progress still sees it
        self.shutdown.notify_one();
        if let Err(err) = self.handle.await {
            log::warn!("Sweeper task ended abnormally: {}", err);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
