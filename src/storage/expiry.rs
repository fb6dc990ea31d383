//! Background Expiry Sweeper
//!
//! The store never checks deadlines on read, so something has to delete keys
//! once they expire. The sweeper is a Tokio task that wakes up on a fixed
//! interval and runs one [`Store::purge_expired`] pass per tick.
//!
//! The task is owned by an [`ExpirySweeper`] handle: dropping the handle (or
//! calling [`ExpirySweeper::stop`]) ends the task, so no timer outlives the
//! server or test that started it.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use minikv::storage::{ExpirySweeper, Store};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let store = Arc::new(Store::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&store), Duration::from_secs(1));
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the handle stops it
    /// drop(sweeper);
    /// # }
    /// ```
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(store: Arc<Store>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately; sweeping an empty store is pointless.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let purged = store.purge_expired();
        if purged > 0 {
            debug!(purged = purged, keys_remaining = store.len(), "Expired keys removed");
        } else {
            trace!("Sweep found nothing to remove");
        }
    }
}
