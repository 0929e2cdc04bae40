use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, NoneAsEmptyString, PickFirst, serde_as};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    dto::validation::{validate_not_blank, validate_poll_request},
    error::PollError,
    state::poll::{ActivePoll, CompletedPoll, OptionStatistics, PollDraft, format_system_time},
};

const DEFAULT_DURATION_SECS: u32 = 30;

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECS
}

/// Poll definition sent with `createPoll` and `nextQuestion`.
#[serde_as]
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_poll_request"))]
pub struct PollRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub question: String,
    #[validate(length(min = 2, message = "A poll needs at least two options"))]
    pub options: Vec<String>,
    /// Answering window in seconds; numeric strings are accepted.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_duration")]
    #[validate(range(min = 1, message = "Duration must be at least one second"))]
    pub duration: u32,
    /// Empty strings are treated as "no correct answer".
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub correct_answer: Option<String>,
}

impl PollRequest {
    /// Validate the payload against static rules and configured limits.
    pub fn into_draft(self, config: &AppConfig) -> Result<PollDraft, PollError> {
        self.validate()?;

        if self.options.len() > config.max_options {
            return Err(PollError::Validation(format!(
                "A poll accepts at most {} options",
                config.max_options
            )));
        }
        if self.duration > config.max_duration_secs {
            return Err(PollError::Validation(format!(
                "Duration must not exceed {} seconds",
                config.max_duration_secs
            )));
        }

        Ok(PollDraft {
            question: self.question.trim().to_owned(),
            options: self
                .options
                .iter()
                .map(|option| option.trim().to_owned())
                .collect(),
            duration_secs: self.duration,
            correct_answer: self
                .correct_answer
                .map(|answer| answer.trim().to_owned()),
        })
    }
}

/// Payload of `submitAnswer`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    /// Student identifier, the display name used at join.
    pub student_id: String,
    pub answer: String,
}

/// Live view of the active poll, as carried by `pollCreated` and `pollUpdated`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub responses: IndexMap<String, u32>,
    /// Seconds left at `serverTime`; clients start their local countdown from it.
    pub duration: u32,
    /// Answering window fixed at creation, in seconds.
    pub total_duration: u32,
    /// Same value as `duration`.
    pub remaining_time: u32,
    /// Milliseconds since the Unix epoch when the poll opened.
    pub poll_start_time: u64,
    /// Milliseconds since the Unix epoch when the snapshot was taken.
    pub server_time: u64,
}

impl PollSnapshot {
    pub fn at(poll: &ActivePoll, now_ms: u64) -> Self {
        let remaining = poll.remaining_secs_at(now_ms);
        Self {
            question: poll.question.clone(),
            options: poll.options.clone(),
            correct_answer: poll.correct_answer.clone(),
            responses: poll.responses.clone(),
            duration: remaining,
            total_duration: poll.duration_secs,
            remaining_time: remaining,
            poll_start_time: poll.start_timestamp_ms,
            server_time: now_ms,
        }
    }
}

/// Vote count and rounded share of a single option.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
pub struct OptionStatisticsDto {
    pub votes: u32,
    pub percentage: u32,
}

impl From<OptionStatistics> for OptionStatisticsDto {
    fn from(value: OptionStatistics) -> Self {
        Self {
            votes: value.votes,
            percentage: value.percentage,
        }
    }
}

/// Final snapshot broadcast with `pollResults`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    #[serde(flatten)]
    pub poll: PollSnapshot,
    pub statistics: IndexMap<String, OptionStatisticsDto>,
    pub total_votes: u32,
}

impl PollResults {
    pub fn at(poll: &ActivePoll, now_ms: u64) -> Self {
        Self {
            poll: PollSnapshot::at(poll, now_ms),
            statistics: poll
                .statistics()
                .into_iter()
                .map(|(option, stats)| (option, stats.into()))
                .collect(),
            total_votes: poll.total_votes(),
        }
    }
}

/// Completed poll as listed in `pollHistory`, `pollHistoryUpdated` and the HTTP API.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollRecordResponse {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub responses: IndexMap<String, u32>,
    pub correct_answer: Option<String>,
    pub is_final: bool,
    pub timestamp: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CompletedPoll> for PollRecordResponse {
    fn from(value: CompletedPoll) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            responses: value.responses,
            correct_answer: value.correct_answer,
            is_final: value.is_final,
            timestamp: value.timestamp,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Query string accepted by `GET /api/polls`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct PollListQuery {
    /// Maximum number of records to return, most recent first.
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<u32>,
}

/// Response body of `GET /api/polls`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PollListResponse {
    pub polls: Vec<PollRecordResponse>,
}

/// Static liveness payload of `GET /api/polls/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PollApiStatus {
    pub status: String,
    pub message: String,
}
