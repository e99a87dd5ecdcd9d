//! Periodic unblock sweep
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::store::TruckStore;
use super::truck_service::TruckService;

/// Run `unblock_expired` every `period` until `shutdown` flips to true or its
/// sender is dropped. The first sweep runs immediately.
pub fn spawn_unblock_sweep<S: TruckStore + 'static>(
    trucks: Arc<TruckService<S>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match trucks.unblock_expired().await {
                        Ok(0) => {}
                        Ok(lifted) => info!(lifted, "unblock sweep finished"),
                        Err(err) => error!(error = %err, "unblock sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("unblock sweep stopped");
    })
}
