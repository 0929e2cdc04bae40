use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::{poll::PollSnapshot, ws::StatsPayload};

/// Response of `GET /api/session`: what a freshly joined teacher would see.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub active_poll: Option<PollSnapshot>,
    pub students: Vec<String>,
    pub stats: StatsPayload,
    /// True while the durable store is unavailable.
    pub degraded: bool,
}
