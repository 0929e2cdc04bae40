//! Runtime representation of the active poll and of completed poll records.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::dao::models::PollRecordEntity;

/// Validated poll definition, ready to be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<String>,
    pub duration_secs: u32,
    pub correct_answer: Option<String>,
}

/// The question currently open for answers.
///
/// Values are replaced wholesale by the session; [`ActivePoll::with_vote`] returns a new
/// instance rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePoll {
    /// Question text shown to students.
    pub question: String,
    /// Option labels in display order.
    pub options: Vec<String>,
    /// Option designated as the correct one, if any.
    pub correct_answer: Option<String>,
    /// Answering window in seconds, fixed at creation.
    pub duration_secs: u32,
    /// Milliseconds since the Unix epoch when the poll opened.
    pub start_timestamp_ms: u64,
    /// Vote count per option label, in first-vote order.
    pub responses: IndexMap<String, u32>,
}

/// Vote count and share of a single option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionStatistics {
    pub votes: u32,
    /// Share of all votes, rounded to the nearest whole percent.
    pub percentage: u32,
}

impl ActivePoll {
    /// Open a poll from a validated draft at `now_ms`.
    pub fn start(draft: PollDraft, now_ms: u64) -> Self {
        Self {
            question: draft.question,
            options: draft.options,
            correct_answer: draft.correct_answer,
            duration_secs: draft.duration_secs,
            start_timestamp_ms: now_ms,
            responses: IndexMap::new(),
        }
    }

    /// Whether `answer` is one of the poll's option labels.
    pub fn has_option(&self, answer: &str) -> bool {
        self.options.iter().any(|option| option == answer)
    }

    /// Copy of the poll with one more vote for `answer`.
    pub fn with_vote(&self, answer: &str) -> Self {
        let mut next = self.clone();
        *next.responses.entry(answer.to_owned()).or_insert(0) += 1;
        next
    }

    pub fn total_votes(&self) -> u32 {
        self.responses.values().sum()
    }

    /// Seconds left on the countdown at `now_ms`.
    pub fn remaining_secs_at(&self, now_ms: u64) -> u32 {
        remaining_time(self.duration_secs, self.start_timestamp_ms, now_ms)
    }

    /// Seconds left on the countdown right now.
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs_at(now_ms())
    }

    /// Per-option vote counts and percentages, in option order.
    pub fn statistics(&self) -> IndexMap<String, OptionStatistics> {
        let total = self.total_votes();
        self.options
            .iter()
            .map(|option| {
                let votes = self.responses.get(option).copied().unwrap_or(0);
                let percentage = if total > 0 {
                    ((f64::from(votes) / f64::from(total)) * 100.0).round() as u32
                } else {
                    0
                };
                (option.clone(), OptionStatistics { votes, percentage })
            })
            .collect()
    }
}

/// `max(0, ceil(duration - elapsed))`, with elapsed measured in milliseconds.
///
/// A start time in the future (clock skew) counts as zero elapsed time.
pub fn remaining_time(duration_secs: u32, start_timestamp_ms: u64, now_ms: u64) -> u32 {
    let elapsed_ms = now_ms.saturating_sub(start_timestamp_ms);
    let total_ms = u64::from(duration_secs) * 1_000;
    let left_ms = total_ms.saturating_sub(elapsed_ms);
    left_ms.div_ceil(1_000) as u32
}

/// True when at least one student is connected and every connected student has answered.
pub fn has_all_students_answered(student_count: usize, response_count: usize) -> bool {
    student_count > 0 && response_count > 0 && response_count >= student_count
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Snapshot of a poll after it stopped accepting answers.
///
/// The same value is appended to the in-memory history and written to the durable store, so
/// both copies share `timestamp`, which is what history reconciliation keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPoll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub responses: IndexMap<String, u32>,
    pub correct_answer: Option<String>,
    pub is_final: bool,
    /// RFC 3339 completion time.
    pub timestamp: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl CompletedPoll {
    /// Close `poll` at the current time.
    pub fn from_active(poll: &ActivePoll, is_final: bool) -> Self {
        Self::from_active_at(poll, is_final, SystemTime::now())
    }

    pub fn from_active_at(poll: &ActivePoll, is_final: bool, closed_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: poll.question.clone(),
            options: poll.options.clone(),
            responses: poll.responses.clone(),
            correct_answer: poll.correct_answer.clone(),
            is_final,
            timestamp: format_system_time(closed_at),
            created_at: closed_at,
            updated_at: closed_at,
        }
    }

    /// Key used to detect the same poll coming from both history sources.
    pub fn reconciliation_key(&self) -> (&str, &str) {
        (self.question.as_str(), self.timestamp.as_str())
    }
}

/// Format a timestamp as RFC 3339.
pub fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

impl From<PollRecordEntity> for CompletedPoll {
    fn from(value: PollRecordEntity) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            responses: value.responses,
            correct_answer: value.correct_answer,
            is_final: value.is_final,
            timestamp: value.timestamp,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<CompletedPoll> for PollRecordEntity {
    fn from(value: CompletedPoll) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            responses: value.responses,
            correct_answer: value.correct_answer,
            is_final: value.is_final,
            timestamp: value.timestamp,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(duration_secs: u32) -> PollDraft {
        PollDraft {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into(), "5".into()],
            duration_secs,
            correct_answer: Some("4".into()),
        }
    }

    #[test]
    fn remaining_time_starts_at_full_duration() {
        let poll = ActivePoll::start(draft(30), 10_000);
        assert_eq!(poll.remaining_secs_at(10_000), 30);
    }

    #[test]
    fn remaining_time_rounds_partial_seconds_up() {
        let poll = ActivePoll::start(draft(30), 10_000);
        assert_eq!(poll.remaining_secs_at(10_001), 30);
        assert_eq!(poll.remaining_secs_at(10_999), 30);
        assert_eq!(poll.remaining_secs_at(11_000), 29);
        assert_eq!(poll.remaining_secs_at(39_001), 1);
    }

    #[test]
    fn remaining_time_is_non_increasing_and_hits_zero() {
        let poll = ActivePoll::start(draft(5), 0);
        let mut previous = u32::MAX;
        for now in (0..8_000).step_by(250) {
            let remaining = poll.remaining_secs_at(now);
            assert!(remaining <= previous, "countdown went up at {now}ms");
            previous = remaining;
        }
        assert_eq!(poll.remaining_secs_at(5_000), 0);
        assert_eq!(poll.remaining_secs_at(60_000), 0);
    }

    #[test]
    fn clock_skew_does_not_extend_the_countdown() {
        let poll = ActivePoll::start(draft(10), 50_000);
        assert_eq!(poll.remaining_secs_at(40_000), 10);
    }

    #[test]
    fn with_vote_creates_and_increments_keys() {
        let poll = ActivePoll::start(draft(30), 0);
        let once = poll.with_vote("4");
        let twice = once.with_vote("4").with_vote("3");

        assert!(poll.responses.is_empty());
        assert_eq!(once.responses.get("4"), Some(&1));
        assert_eq!(twice.responses.get("4"), Some(&2));
        assert_eq!(twice.responses.get("3"), Some(&1));
        assert_eq!(twice.total_votes(), 3);
    }

    #[test]
    fn statistics_cover_every_option() {
        let poll = ActivePoll::start(draft(30), 0)
            .with_vote("4")
            .with_vote("4")
            .with_vote("3");
        let stats = poll.statistics();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats["4"], OptionStatistics { votes: 2, percentage: 67 });
        assert_eq!(stats["3"], OptionStatistics { votes: 1, percentage: 33 });
        assert_eq!(stats["5"], OptionStatistics { votes: 0, percentage: 0 });
    }

    #[test]
    fn all_answered_requires_students() {
        assert!(!has_all_students_answered(0, 0));
        assert!(!has_all_students_answered(3, 2));
        assert!(has_all_students_answered(3, 3));
    }

    #[test]
    fn completed_poll_round_trips_through_entity() {
        let poll = ActivePoll::start(draft(30), 0).with_vote("4");
        let completed = CompletedPoll::from_active(&poll, true);
        let entity: PollRecordEntity = completed.clone().into();
        assert_eq!(CompletedPoll::from(entity), completed);
        assert!(completed.is_final);
        assert_eq!(completed.responses.get("4"), Some(&1));
    }
}
