//! Read-only HTTP projections of stored polls and the live session.

use uuid::Uuid;

use crate::{
    dto::{
        poll::{PollApiStatus, PollListResponse, PollRecordResponse, PollSnapshot},
        session::SessionOverview,
    },
    error::ServiceError,
    services::poll_service,
    state::{
        SharedState,
        poll::{CompletedPoll, now_ms},
    },
};

/// Stored polls, most recent first. Requires a healthy durable store.
pub async fn list_polls(
    state: &SharedState,
    limit: Option<u32>,
) -> Result<PollListResponse, ServiceError> {
    let store = state
        .healthy_poll_store()
        .await
        .ok_or(ServiceError::Degraded)?;
    let limit = limit.unwrap_or(state.config().history_limit);

    let polls = store
        .list_polls(Some(limit))
        .await?
        .into_iter()
        .map(|entity| PollRecordResponse::from(CompletedPoll::from(entity)))
        .collect();
    Ok(PollListResponse { polls })
}

/// One stored poll by identifier.
pub async fn get_poll(state: &SharedState, id: Uuid) -> Result<PollRecordResponse, ServiceError> {
    let store = state
        .healthy_poll_store()
        .await
        .ok_or(ServiceError::Degraded)?;

    let entity = store
        .find_poll(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("poll {id}")))?;
    Ok(CompletedPoll::from(entity).into())
}

/// Static liveness answer of the poll API.
pub fn api_status() -> PollApiStatus {
    PollApiStatus {
        status: "ok".into(),
        message: "Poll API is running".into(),
    }
}

/// Active poll, roster and counters as a teacher would see them on join.
pub async fn session_overview(state: &SharedState) -> SessionOverview {
    let active_poll = poll_service::active_poll(state)
        .await
        .map(|poll| PollSnapshot::at(&poll, now_ms()));
    let stats = poll_service::current_stats(state).await;
    let students = state.registry().read().await.roster().to_vec();

    SessionOverview {
        active_poll,
        students,
        stats,
        degraded: state.is_degraded(),
    }
}
