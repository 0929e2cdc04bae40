use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the durable store is reachable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.poll_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "poll store health check failed");
            }
        }
        None => warn!("poll store unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
