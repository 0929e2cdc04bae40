use indexmap::IndexMap;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::dao::models::PollRecordEntity;

/// BSON layout of a completed poll inside the `polls` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPollDocument {
    #[serde(rename = "_id")]
    id: String,
    question: String,
    options: Vec<String>,
    #[serde(default)]
    responses: IndexMap<String, i64>,
    correct_answer: Option<String>,
    #[serde(default)]
    is_final: bool,
    timestamp: String,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<PollRecordEntity> for MongoPollDocument {
    fn from(value: PollRecordEntity) -> Self {
        Self {
            id: value.id.to_string(),
            question: value.question,
            options: value.options,
            responses: value
                .responses
                .into_iter()
                .map(|(option, votes)| (option, i64::from(votes)))
                .collect(),
            correct_answer: value.correct_answer,
            is_final: value.is_final,
            timestamp: value.timestamp,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoPollDocument> for PollRecordEntity {
    type Error = uuid::Error;

    fn try_from(value: MongoPollDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&value.id)?,
            question: value.question,
            options: value.options,
            responses: value
                .responses
                .into_iter()
                .map(|(option, votes)| {
                    let count = vote_count(&value.id, &option, votes);
                    (option, count)
                })
                .collect(),
            correct_answer: value.correct_answer,
            is_final: value.is_final,
            timestamp: value.timestamp,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

/// Stored counts are `i64`; anything outside `u32` is clamped and reported.
fn vote_count(poll: &str, option: &str, votes: i64) -> u32 {
    match u32::try_from(votes) {
        Ok(count) => count,
        Err(_) => {
            let clamped = if votes < 0 { 0 } else { u32::MAX };
            warn!(poll, option, votes, clamped, "out-of-range vote count in stored poll");
            clamped
        }
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}
