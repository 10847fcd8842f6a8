use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::VenueClient;
use crate::account::state::AccountDataState;
use crate::shutdown::Shutdown;

/// Poll the venue for the absolute position and overwrite the local one.
pub fn spawn_position_poller(
    venue: Arc<dyn VenueClient>,
    account: AccountDataState,
    symbol: String,
    every: Duration,
    call_timeout: Duration,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }
            match timeout(call_timeout, venue.position(&symbol)).await {
                Ok(Ok(quantity)) => {
                    debug!(%symbol, %quantity, "Position polled");
                    account.set_polled_position(quantity);
                }
                Ok(Err(e)) => warn!(%symbol, error = %e, "Position poll failed"),
                Err(_) => warn!(%symbol, "Position poll timed out"),
            }
        }
        info!("Position poller stopped");
    })
}
