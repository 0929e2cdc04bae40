use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the classroom poll backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::polls::list_polls,
        crate::routes::polls::api_status,
        crate::routes::polls::get_poll,
        crate::routes::polls::session_overview,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::poll::PollRequest,
            crate::dto::poll::AnswerSubmission,
            crate::dto::poll::PollSnapshot,
            crate::dto::poll::PollResults,
            crate::dto::poll::OptionStatisticsDto,
            crate::dto::poll::PollRecordResponse,
            crate::dto::poll::PollListResponse,
            crate::dto::poll::PollApiStatus,
            crate::dto::session::SessionOverview,
            crate::dto::ws::JoinRequest,
            crate::dto::ws::StatsPayload,
            crate::dto::ws::ErrorPayload,
            crate::dto::ws::PingPayload,
            crate::dto::ws::DebugInfo,
            crate::state::Role,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "polls", description = "Stored polls and live session snapshots"),
        (name = "realtime", description = "WebSocket protocol for teachers and students"),
    )
)]
pub struct ApiDoc;
