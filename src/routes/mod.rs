use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod polls;
pub mod websocket;

/// Compose the realtime, read-only and documentation routes over the shared state.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(websocket::router())
        .merge(polls::router())
        .merge(health::router())
        .merge(docs::router())
        .with_state(state)
}
