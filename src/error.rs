use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::{
    dao::storage::StorageError,
    state::state_machine::{ApplyError, InvalidTransition, PollEvent, PollPhase},
};

/// Errors raised by the realtime poll protocol.
///
/// The `Display` output is sent verbatim to the originating connection as an `error` event.
#[derive(Debug, Error)]
pub enum PollError {
    /// A poll is already open and must be ended or advanced first.
    #[error("A poll is already active")]
    Conflict,
    /// The operation needs an open poll.
    #[error("No active poll")]
    NoActivePoll,
    /// The student already answered the current poll.
    #[error("You have already submitted an answer")]
    DuplicateAnswer,
    /// Payload failed validation.
    #[error("{0}")]
    Validation(String),
    /// Durable store failure. Raised only inside background persistence, never sent to clients.
    #[error("poll storage failed: {0}")]
    Persistence(#[from] StorageError),
    /// Sender lacks the role required for the action.
    #[error("{0}")]
    Authorization(String),
    /// The session moved on between planning and applying a transition.
    #[error("Session state changed, please retry")]
    Stale(#[from] ApplyError),
}

impl From<InvalidTransition> for PollError {
    fn from(err: InvalidTransition) -> Self {
        match (err.from, err.event) {
            (PollPhase::Active, PollEvent::Create) => PollError::Conflict,
            _ => PollError::NoActivePoll,
        }
    }
}

impl From<ValidationErrors> for PollError {
    fn from(err: ValidationErrors) -> Self {
        PollError::Validation(validation_message(&err))
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", validation_message(&err)))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Flatten validator output into a single human-readable sentence.
///
/// Field errors carrying a custom message contribute that message; others fall back to
/// `field: code`.
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_messages(errors, &mut messages);
    if messages.is_empty() {
        return "Invalid payload".into();
    }
    messages.sort();
    messages.dedup();
    messages.join("; ")
}

fn collect_messages(errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    match &error.message {
                        Some(message) => out.push(message.to_string()),
                        None => out.push(format!("{field}: {}", error.code)),
                    }
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(nested, out),
            ValidationErrorsKind::List(items) => {
                for nested in items.values() {
                    collect_messages(nested, out);
                }
            }
        }
    }
}
