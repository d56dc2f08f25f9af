//! Background expiry sweep

use crate::manager::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest period the sweeper runs at; shorter requests are raised to it
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);

/// Running sweeper; stop it with [`SweeperHandle::shutdown`]
#[derive(Debug)]
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.join.await;
    }

    /// Check if the sweeper task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl SessionManager {
    /// Spawn the periodic sweep at the configured interval
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn_expiry_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let period = self.config().sweep_interval();
        self.spawn_expiry_sweeper_every(period)
    }

    /// Spawn the periodic sweep with an explicit period
    ///
    /// Periods below [`MIN_SWEEP_PERIOD`] are raised to it.
    #[must_use]
    pub fn spawn_expiry_sweeper_every(self: &Arc<Self>, period: Duration) -> SweeperHandle {
        let period = if period < MIN_SWEEP_PERIOD {
            warn!(
                requested_ms = period.as_millis(),
                min_ms = MIN_SWEEP_PERIOD.as_millis(),
                "Sweep period too short, using minimum"
            );
            MIN_SWEEP_PERIOD
        } else {
            period
        };
        let (stop, mut stopped) = watch::channel(false);
        let manager = Arc::clone(self);

        info!(period_ms = period.as_millis(), "Starting expiry sweeper");
        let join = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let report = manager.sweep_expired();
                        debug!(expired = report.expired.len(), "Sweep tick");
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Expiry sweeper stopped");
        });

        SweeperHandle { stop, join }
    }
}
