//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::dto::poll::PollRequest;

/// Rejects strings that are empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Question must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Cross-field checks for a poll definition.
///
/// Options must be non-blank and distinct after trimming, and a correct answer, when given,
/// must be one of them.
pub fn validate_poll_request(request: &PollRequest) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for option in &request.options {
        let option = option.trim();
        if option.is_empty() {
            let mut err = ValidationError::new("blank_option");
            err.message = Some("Options must not be empty".into());
            return Err(err);
        }
        if !seen.insert(option) {
            let mut err = ValidationError::new("duplicate_option");
            err.message = Some(format!("Option `{option}` is listed more than once").into());
            return Err(err);
        }
    }

    if let Some(correct) = request.correct_answer.as_deref()
        && !seen.contains(correct.trim())
    {
        let mut err = ValidationError::new("unknown_correct_answer");
        err.message = Some("Correct answer must be one of the options".into());
        return Err(err);
    }

    Ok(())
}
