use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{poll_store::PollStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep the durable poll store connected, flipping the shared state in and out of degraded mode.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PollStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_poll_store(store.clone()).await;
                info!("poll store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !watch_store(&state, store.as_ref()).await {
                    warn!("exhausted poll store reconnect attempts; staying in degraded mode");
                }
            }
            Err(err) => {
                warn!(error = %err, "poll store connection attempt failed");
                state.set_degraded(true);
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Health-poll an installed store. Returns `false` once in-place reconnection gives up.
async fn watch_store(state: &SharedState, store: &dyn PollStore) -> bool {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("poll store healthy again; leaving degraded mode");
                    state.set_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "poll store health check failed");
                if !reconnect(state, store).await {
                    return false;
                }
                state.set_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn PollStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "poll store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "poll store reconnect failed; entering degraded mode");
                    state.set_degraded(true);
                } else {
                    warn!(attempt, error = %err, "poll store reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}
