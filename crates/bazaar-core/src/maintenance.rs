//! Periodic background maintenance.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Runs `tick` every `period` until `shutdown` turns true or its sender is
/// dropped.
///
/// The first tick fires one full period after spawning. A zero period is
/// raised to one millisecond.
pub fn spawn_periodic<F>(
    owner: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(owner = %owner, "Maintenance stopped");
    })
}
