//! Periodic broadcasts: the poll countdown and the liveness ping.

use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{
    services::{poll_events, poll_service},
    state::{SharedState, poll::format_system_time},
};

/// Broadcast `pollTimeUpdate` every `tick_interval` while a poll is active.
///
/// The countdown keeps ticking at zero until the teacher ends the poll.
pub async fn run_poll_clock(state: SharedState) {
    let mut ticker = ticking(state.config().tick_interval);
    loop {
        ticker.tick().await;
        poll_service::broadcast_remaining_time(&state).await;
    }
}

/// Broadcast a `ping` carrying the server time to every connection.
pub async fn run_liveness_ping(state: SharedState) {
    let mut ticker = ticking(state.config().ping_interval);
    loop {
        ticker.tick().await;
        let connections = state.gateway().connection_count();
        if connections == 0 {
            continue;
        }
        debug!(connections, "sending liveness ping");
        poll_events::broadcast_ping(&state, format_system_time(SystemTime::now()));
    }
}

fn ticking(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
