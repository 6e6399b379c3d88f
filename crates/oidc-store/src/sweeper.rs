//! Background removal of records whose expiry has elapsed.
//!
//! Lookups already hide expired records; the sweeper only reclaims space for
//! backends without native TTL deletion.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::model::ModelName;
use crate::store::DynRecordStore;

/// Periodically purges expired records from every model collection.
pub struct ExpirySweeper {
    store: DynRecordStore,
    period: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper running every `period`.
    #[must_use]
    pub fn new(store: DynRecordStore, period: Duration) -> Self {
        Self { store, period }
    }

    /// Purge every model once. Per-model failures are logged and skipped.
    ///
    /// Returns the total number of records removed.
    pub async fn sweep_once(&self) -> u64 {
        let mut total = 0;
        for model in ModelName::ALL {
            match self.store.purge_expired(model).await {
                Ok(removed) => {
                    if removed > 0 {
                        debug!(model = %model, removed, "Purged expired records");
                    }
                    total += removed;
                }
                Err(e) if e.is_not_connected() => {
                    debug!("Store not connected, skipping sweep");
                    return total;
                }
                Err(e) => error!(model = %model, error = %e, "Expiry sweep failed"),
            }
        }
        total
    }

    /// Start the sweeper in a background task.
    ///
    /// Returns a shutdown sender that can be used to stop the sweeper.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(period_secs = self.period.as_secs(), "Expiry sweeper started");

            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_once().await;
                        if removed > 0 {
                            info!(removed, "Expiry sweep complete");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Expiry sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
