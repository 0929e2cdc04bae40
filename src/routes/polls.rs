use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        poll::{PollApiStatus, PollListQuery, PollListResponse, PollRecordResponse},
        session::SessionOverview,
    },
    error::AppError,
    services::public_service,
    state::SharedState,
};

/// Read-only endpoints over stored polls and the live session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/polls", get(list_polls))
        .route("/api/polls/status", get(api_status))
        .route("/api/polls/{id}", get(get_poll))
        .route("/api/session", get(session_overview))
}

#[utoipa::path(
    get,
    path = "/api/polls",
    tag = "polls",
    params(PollListQuery),
    responses(
        (status = 200, description = "Stored polls, most recent first", body = PollListResponse),
        (status = 400, description = "Invalid limit"),
        (status = 503, description = "Storage unavailable (degraded mode)")
    )
)]
/// List completed polls from the durable store.
pub async fn list_polls(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<PollListQuery>>,
) -> Result<Json<PollListResponse>, AppError> {
    let payload = public_service::list_polls(&state, query.limit).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/polls/status",
    tag = "polls",
    responses((status = 200, description = "Poll API is running", body = PollApiStatus))
)]
/// Liveness of the poll API; does not touch storage.
pub async fn api_status() -> Json<PollApiStatus> {
    Json(public_service::api_status())
}

#[utoipa::path(
    get,
    path = "/api/polls/{id}",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Poll record identifier")),
    responses(
        (status = 200, description = "Stored poll", body = PollRecordResponse),
        (status = 404, description = "Unknown poll"),
        (status = 503, description = "Storage unavailable (degraded mode)")
    )
)]
/// Fetch a single completed poll.
pub async fn get_poll(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PollRecordResponse>, AppError> {
    let payload = public_service::get_poll(&state, id).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/session",
    tag = "polls",
    responses((status = 200, description = "Active poll, roster and counters", body = SessionOverview))
)]
/// Snapshot of the live session.
pub async fn session_overview(State(state): State<SharedState>) -> Json<SessionOverview> {
    Json(public_service::session_overview(&state).await)
}
