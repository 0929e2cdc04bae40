use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::poll::{AnswerSubmission, PollRequest, PollSnapshot},
    error::PollError,
    state::registry::{ConnectionStats, Role},
};

/// Messages accepted from WebSocket clients, framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Join(JoinRequest),
    CreatePoll(PollRequest),
    SubmitAnswer(AnswerSubmission),
    NextQuestion(PollRequest),
    EndPoll,
    PreparingNextQuestion,
    RequestPollHistory,
    RequestStudentList,
    /// Name of the student to remove.
    KickStudent(String),
    ForceBroadcast,
    RequestDebug,
}

impl ClientMessage {
    /// Parse a text frame, mapping malformed input to a client-facing validation error.
    pub fn from_json_str(text: &str) -> Result<Self, PollError> {
        serde_json::from_str(text)
            .map_err(|err| PollError::Validation(format!("Malformed message: {err}")))
    }
}

/// Payload of `join`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub role: Role,
    /// Display name; required for students to appear on the roster.
    #[serde(default)]
    pub name: Option<String>,
}

/// Named event pushed to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerEvent {
    pub event: &'static str,
    pub data: Value,
}

impl ServerEvent {
    /// Event without payload; `data` is serialized as `null`.
    pub fn bare(event: &'static str) -> Self {
        Self {
            event,
            data: Value::Null,
        }
    }

    /// Serialize `payload` into the `data` field.
    pub fn json<T>(event: &'static str, payload: &T) -> serde_json::Result<Self>
    where
        T: ?Sized + Serialize,
    {
        Ok(Self {
            event,
            data: serde_json::to_value(payload)?,
        })
    }
}

/// Payload of `stats`.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub connected_students: usize,
    pub connected_teachers: usize,
    pub response_count: usize,
    /// Every connected student answered the active poll.
    pub all_answered: bool,
}

impl From<ConnectionStats> for StatsPayload {
    fn from(value: ConnectionStats) -> Self {
        Self {
            connected_students: value.connected_students,
            connected_teachers: value.connected_teachers,
            response_count: value.response_count,
            all_answered: crate::state::poll::has_all_students_answered(
                value.connected_students,
                value.response_count,
            ),
        }
    }
}

/// Payload of `error`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

/// Payload of the periodic `ping`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PingPayload {
    /// RFC 3339 server time.
    pub time: String,
}

/// Payload of `debugInfo`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub socket_id: Uuid,
    pub active_poll: Option<PollSnapshot>,
    pub connected_clients: usize,
    /// `teacher`, `student` or `unknown` before joining.
    pub your_role: String,
    pub student_names: Vec<String>,
}
