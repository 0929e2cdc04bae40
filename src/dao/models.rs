use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Completed poll as persisted by the storage layer.
///
/// Records are append-only: once written they are never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollRecordEntity {
    /// Primary key of the record.
    pub id: Uuid,
    /// Question text shown to students.
    pub question: String,
    /// Option labels in display order.
    pub options: Vec<String>,
    /// Vote count per option label, in first-vote order.
    pub responses: IndexMap<String, u32>,
    /// Option designated as the correct one, if any.
    pub correct_answer: Option<String>,
    /// True when the poll was closed by an explicit end rather than by advancing.
    pub is_final: bool,
    /// RFC 3339 completion timestamp, used together with the question to reconcile histories.
    pub timestamp: String,
    /// Creation timestamp for ordering.
    pub created_at: SystemTime,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}
