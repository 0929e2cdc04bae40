/// Connection lifecycle: join, disconnect, kick and per-connection queries.
pub mod connection_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Named outbound events and their emit helpers.
pub mod poll_events;
/// Poll lifecycle engine.
pub mod poll_service;
/// Read-only projections served over HTTP.
pub mod public_service;
/// Background reconnection of the durable poll store.
pub mod storage_supervisor;
/// Countdown and liveness broadcasts.
pub mod ticker;
/// WebSocket connection and message handling service.
pub mod websocket_service;
