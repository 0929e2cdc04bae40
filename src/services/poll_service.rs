//! Poll lifecycle engine: create, answer, advance, end.
//!
//! Every mutating operation holds the session lock from validation to broadcast, so checks
//! and updates are atomic and events leave in mutation order. Durable writes are spawned and
//! never block the realtime path.

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::{
    dao::poll_store::PollStore,
    dto::{
        poll::{AnswerSubmission, PollRequest},
        ws::StatsPayload,
    },
    error::PollError,
    services::poll_events,
    state::{
        ConnectionId, SharedState,
        poll::{ActivePoll, CompletedPoll, PollDraft, now_ms},
        session::{PollSession, load_combined_history},
        state_machine::PollEvent,
    },
};

/// Open a new poll. Fails with [`PollError::Conflict`] while another poll is active.
pub async fn create_poll(state: &SharedState, request: PollRequest) -> Result<(), PollError> {
    let draft = request.into_draft(state.config())?;

    let mut session = state.session().lock().await;
    let plan = session.machine.plan(PollEvent::Create)?;
    let poll = open_poll(&mut session, draft);
    session.machine.apply(plan)?;

    info!(
        question = %poll.question,
        options = poll.options.len(),
        duration = poll.duration_secs,
        "poll created"
    );
    poll_events::broadcast_poll_created(state, &poll);

    let in_memory = session.state.history().to_vec();
    drop(session);

    spawn_history_broadcast(state, in_memory);
    Ok(())
}

/// Record `submission` against the active poll and return the updated vote counts.
pub async fn submit_answer(
    state: &SharedState,
    submission: AnswerSubmission,
) -> Result<IndexMap<String, u32>, PollError> {
    let student_id = submission.student_id.trim();
    if student_id.is_empty() {
        return Err(PollError::Validation("Student name is required".into()));
    }
    let answer = submission.answer.trim();

    let mut session = state.session().lock().await;
    let Some(poll) = session.state.active_poll() else {
        return Err(PollError::NoActivePoll);
    };
    if session.state.has_answered(student_id) {
        return Err(PollError::DuplicateAnswer);
    }
    if !poll.has_option(answer) {
        return Err(PollError::Validation(
            "Answer must be one of the poll options".into(),
        ));
    }
    if state.config().reject_late_answers && poll.remaining_secs() == 0 {
        return Err(PollError::Validation("Time is up for this poll".into()));
    }

    let updated = poll.with_vote(answer);
    let mut answered = session.state.answered().clone();
    answered.insert(student_id.to_owned());
    session.state.set_answered(answered);
    session.state.set_active_poll(Some(updated.clone()));

    debug!(student = %student_id, answer = %answer, "answer recorded");
    poll_events::broadcast_poll_updated(state, &updated);
    emit_stats(state, &session).await;

    Ok(updated.responses)
}

/// Close the current poll (if any) as a non-final record and open the next one.
pub async fn advance_to_next_question(
    state: &SharedState,
    request: PollRequest,
) -> Result<(), PollError> {
    let draft = request.into_draft(state.config())?;

    let mut session = state.session().lock().await;
    let plan = session.machine.plan(PollEvent::Advance)?;

    if let Some(current) = session.state.active_poll() {
        let record = CompletedPoll::from_active(current, false);
        info!(
            question = %record.question,
            votes = current.total_votes(),
            "closing poll for next question"
        );
        append_history(&mut session, record.clone());
        spawn_persist(state, record);
    }

    let poll = open_poll(&mut session, draft);
    session.machine.apply(plan)?;

    info!(question = %poll.question, "next question opened");
    poll_events::broadcast_poll_created(state, &poll);
    poll_events::broadcast_history_updated(state, session.state.history());
    Ok(())
}

/// Close the active poll as the final record of the session and return to idle.
pub async fn end_poll(state: &SharedState) -> Result<(), PollError> {
    let mut session = state.session().lock().await;
    let plan = session.machine.plan(PollEvent::End)?;
    let Some(poll) = session.state.active_poll().cloned() else {
        return Err(PollError::NoActivePoll);
    };

    let record = CompletedPoll::from_active(&poll, true);
    append_history(&mut session, record.clone());
    spawn_persist(state, record);

    info!(question = %poll.question, votes = poll.total_votes(), "poll ended");
    poll_events::broadcast_poll_results(state, &poll);
    emit_stats(state, &session).await;

    session.state.set_active_poll(None);
    session.state.reset_answered();
    session.state.reset_history();
    session.machine.apply(plan)?;
    Ok(())
}

/// Tell clients the teacher is preparing another question. No-op while idle.
pub async fn prepare_next_question(state: &SharedState) {
    let session = state.session().lock().await;
    if session.machine.is_active() {
        poll_events::broadcast_preparing_next_question(state);
    }
}

/// Re-send the active poll to everyone. Only teachers may trigger it; others are ignored.
pub async fn force_broadcast(state: &SharedState, connection: ConnectionId) {
    if !state.registry().read().await.is_teacher(connection) {
        debug!(connection = %connection, "ignoring forceBroadcast from non-teacher");
        return;
    }

    let session = state.session().lock().await;
    if let Some(poll) = session.state.active_poll() {
        info!(connection = %connection, "re-broadcasting active poll");
        poll_events::broadcast_poll_created(state, poll);
    }
}

/// In-memory history merged with durable records, memory first.
pub async fn combined_history(state: &SharedState) -> Vec<CompletedPoll> {
    let in_memory = {
        let session = state.session().lock().await;
        session.state.history().to_vec()
    };
    let store = state.healthy_poll_store().await;
    load_combined_history(in_memory, store).await
}

/// Copy of the active poll, if any.
pub async fn active_poll(state: &SharedState) -> Option<ActivePoll> {
    state.session().lock().await.state.active_poll().cloned()
}

/// Broadcast the countdown of the active poll. No-op while idle.
pub async fn broadcast_remaining_time(state: &SharedState) {
    let session = state.session().lock().await;
    if let Some(poll) = session.state.active_poll() {
        poll_events::broadcast_time_update(state, poll.remaining_secs());
    }
}

/// Broadcast connection counters and the number of answers to the active poll.
pub async fn broadcast_stats(state: &SharedState) {
    let session = state.session().lock().await;
    emit_stats(state, &session).await;
}

/// Current `stats` payload.
pub async fn current_stats(state: &SharedState) -> StatsPayload {
    let response_count = state.session().lock().await.state.answered().len();
    state.registry().read().await.stats(response_count).into()
}

async fn emit_stats(state: &SharedState, session: &PollSession) {
    let response_count = session.state.answered().len();
    let stats = state.registry().read().await.stats(response_count);
    poll_events::broadcast_stats(state, stats.into());
}

fn open_poll(session: &mut PollSession, draft: PollDraft) -> ActivePoll {
    let poll = ActivePoll::start(draft, now_ms());
    session.state.set_active_poll(Some(poll.clone()));
    session.state.reset_answered();
    poll
}

fn append_history(session: &mut PollSession, record: CompletedPoll) {
    let mut history = session.state.history().to_vec();
    history.push(record);
    session.state.set_history(history);
}

/// Write `record` to the durable store in the background.
///
/// Single attempt; failures are logged and the in-memory copy stays authoritative.
fn spawn_persist(state: &SharedState, record: CompletedPoll) {
    let state = state.clone();
    tokio::spawn(async move {
        let Some(store) = state.healthy_poll_store().await else {
            warn!(question = %record.question, "storage degraded; completed poll kept in memory only");
            return;
        };

        let id = record.id;
        match persist_record(store.as_ref(), record).await {
            Ok(()) => debug!(poll = %id, "completed poll persisted"),
            Err(err) => error!(poll = %id, error = %err, "failed to persist completed poll"),
        }
    });
}

async fn persist_record(store: &dyn PollStore, record: CompletedPoll) -> Result<(), PollError> {
    store.insert_poll(record.into()).await?;
    Ok(())
}

fn spawn_history_broadcast(state: &SharedState, in_memory: Vec<CompletedPoll>) {
    let state = state.clone();
    tokio::spawn(async move {
        let store = state.healthy_poll_store().await;
        let history = load_combined_history(in_memory, store).await;
        poll_events::broadcast_history(&state, &history);
    });
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            poll_store::{InMemoryPollStore, PollStore, failing::FailingStore},
            storage::StorageOperation,
        },
        services::public_service,
        state::{AppState, Role},
    };

    struct Harness {
        state: SharedState,
        store: InMemoryPollStore,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(AppConfig::default())
        }

        fn with_config(config: AppConfig) -> Self {
            let store = InMemoryPollStore::new();
            let state = AppState::with_store(config, Arc::new(store.clone()));
            Self { state, store }
        }

        async fn connect(
            &self,
            role: Role,
            name: Option<&str>,
        ) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            self.state.gateway().attach(id, tx);
            self.state
                .registry()
                .write()
                .await
                .join(id, role, name.map(Into::into));
            (id, rx)
        }

        async fn wait_for_records(&self, expected: usize) {
            for _ in 0..100 {
                if self.store.len().await >= expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("expected {expected} persisted records");
        }
    }

    fn request(question: &str) -> PollRequest {
        serde_json::from_value(serde_json::json!({
            "question": question,
            "options": ["3", "4", "5"],
            "duration": 30,
            "correctAnswer": "4",
        }))
        .unwrap()
    }

    fn answer(student: &str, answer: &str) -> AnswerSubmission {
        AnswerSubmission {
            student_id: student.into(),
            answer: answer.into(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<(String, Value)> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                events.push((value["event"].as_str().unwrap().to_owned(), value["data"].clone()));
            }
        }
        events
    }

    /// Wait for the background `pollHistory` broadcast that follows a poll creation.
    async fn settle(rx: &mut mpsc::UnboundedReceiver<Message>) {
        let wait = async {
            while let Some(message) = rx.recv().await {
                if let Message::Text(text) = message
                    && text.as_str().contains("\"pollHistory\"")
                {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("pollHistory broadcast");
    }

    fn names(events: &[(String, Value)]) -> Vec<&str> {
        events.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[tokio::test]
    async fn create_poll_broadcasts_full_countdown() {
        let harness = Harness::new();
        let (_, mut rx) = harness.connect(Role::Student, Some("alice")).await;

        create_poll(&harness.state, request("2+2?")).await.unwrap();

        let events = drain(&mut rx);
        let (name, data) = &events[0];
        assert_eq!(name, "pollCreated");
        assert_eq!(data["question"], "2+2?");
        assert_eq!(data["duration"], 30);
        assert_eq!(data["responses"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn create_while_active_conflicts_and_keeps_poll() {
        let harness = Harness::new();
        create_poll(&harness.state, request("first")).await.unwrap();
        submit_answer(&harness.state, answer("alice", "4")).await.unwrap();

        let err = create_poll(&harness.state, request("second")).await.unwrap_err();
        assert!(matches!(err, PollError::Conflict));

        let poll = active_poll(&harness.state).await.unwrap();
        assert_eq!(poll.question, "first");
        assert_eq!(poll.responses.get("4"), Some(&1));
    }

    #[tokio::test]
    async fn duplicate_answers_are_rejected() {
        let harness = Harness::new();
        create_poll(&harness.state, request("2+2?")).await.unwrap();

        let responses = submit_answer(&harness.state, answer("alice", "4")).await.unwrap();
        assert_eq!(responses.get("4"), Some(&1));

        let err = submit_answer(&harness.state, answer("alice", "3")).await.unwrap_err();
        assert!(matches!(err, PollError::DuplicateAnswer));

        let poll = active_poll(&harness.state).await.unwrap();
        assert_eq!(poll.total_votes(), 1);
        assert_eq!(poll.responses.get("3"), None);
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_count_once() {
        let harness = Harness::new();
        create_poll(&harness.state, request("2+2?")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = harness.state.clone();
            handles.push(tokio::spawn(async move {
                submit_answer(&state, answer("alice", "4")).await.is_ok()
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(active_poll(&harness.state).await.unwrap().total_votes(), 1);
    }

    #[tokio::test]
    async fn answers_need_an_active_poll_and_a_known_option() {
        let harness = Harness::new();
        let err = submit_answer(&harness.state, answer("alice", "4")).await.unwrap_err();
        assert!(matches!(err, PollError::NoActivePoll));

        create_poll(&harness.state, request("2+2?")).await.unwrap();
        let err = submit_answer(&harness.state, answer("alice", "22")).await.unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));
        let err = submit_answer(&harness.state, answer("  ", "4")).await.unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));

        // A rejected answer does not consume the student's vote.
        submit_answer(&harness.state, answer("alice", "4")).await.unwrap();
    }

    #[tokio::test]
    async fn late_answers_rejected_when_configured() {
        let config = AppConfig {
            reject_late_answers: true,
            ..AppConfig::default()
        };
        let harness = Harness::with_config(config);
        create_poll(&harness.state, request("2+2?")).await.unwrap();
        {
            let mut session = harness.state.session().lock().await;
            let mut poll = session.state.active_poll().cloned().unwrap();
            poll.start_timestamp_ms -= 60_000;
            session.state.set_active_poll(Some(poll));
        }

        let err = submit_answer(&harness.state, answer("alice", "4")).await.unwrap_err();
        assert_eq!(err.to_string(), "Time is up for this poll");
    }

    #[tokio::test]
    async fn submit_answer_broadcasts_update_and_stats() {
        let harness = Harness::new();
        let (_, mut teacher) = harness.connect(Role::Teacher, None).await;
        harness.connect(Role::Student, Some("alice")).await;
        create_poll(&harness.state, request("2+2?")).await.unwrap();
        settle(&mut teacher).await;

        submit_answer(&harness.state, answer("alice", "4")).await.unwrap();

        let events = drain(&mut teacher);
        assert_eq!(names(&events)[..2], ["pollUpdated", "stats"]);
        assert_eq!(events[0].1["responses"]["4"], 1);
        assert_eq!(events[1].1["responseCount"], 1);
        assert_eq!(events[1].1["connectedStudents"], 1);
        assert_eq!(events[1].1["allAnswered"], true);
    }

    #[tokio::test]
    async fn end_then_create_starts_from_scratch() {
        let harness = Harness::new();
        create_poll(&harness.state, request("first")).await.unwrap();
        submit_answer(&harness.state, answer("alice", "4")).await.unwrap();
        end_poll(&harness.state).await.unwrap();

        create_poll(&harness.state, request("second")).await.unwrap();
        let session = harness.state.session().lock().await;
        assert!(session.state.answered().is_empty());
        assert!(session.state.active_poll().unwrap().responses.is_empty());
    }

    #[tokio::test]
    async fn end_without_poll_fails() {
        let harness = Harness::new();
        let err = end_poll(&harness.state).await.unwrap_err();
        assert!(matches!(err, PollError::NoActivePoll));
    }

    #[tokio::test]
    async fn end_poll_broadcasts_results_with_statistics() {
        let harness = Harness::new();
        let (_, mut rx) = harness.connect(Role::Teacher, None).await;
        create_poll(&harness.state, request("2+2?")).await.unwrap();
        submit_answer(&harness.state, answer("alice", "4")).await.unwrap();
        settle(&mut rx).await;
        submit_answer(&harness.state, answer("bob", "3")).await.unwrap();
        drain(&mut rx);

        end_poll(&harness.state).await.unwrap();

        let events = drain(&mut rx);
        let (name, data) = &events[0];
        assert_eq!(name, "pollResults");
        assert_eq!(data["responses"], serde_json::json!({"4": 1, "3": 1}));
        assert_eq!(data["statistics"]["4"]["percentage"], 50);
        assert_eq!(data["statistics"]["5"]["votes"], 0);
        assert_eq!(names(&events)[1], "stats");
        assert!(!harness.state.session().lock().await.machine.is_active());
    }

    #[tokio::test]
    async fn advancing_builds_history_and_final_record() {
        let harness = Harness::new();
        let (_, mut rx) = harness.connect(Role::Teacher, None).await;
        create_poll(&harness.state, request("q1")).await.unwrap();
        advance_to_next_question(&harness.state, request("q2")).await.unwrap();
        advance_to_next_question(&harness.state, request("q3")).await.unwrap();

        let events = drain(&mut rx);
        let updated: Vec<_> = events
            .iter()
            .filter(|(name, _)| name == "pollHistoryUpdated")
            .collect();
        assert_eq!(updated.last().unwrap().1.as_array().unwrap().len(), 2);

        end_poll(&harness.state).await.unwrap();
        harness.wait_for_records(3).await;

        let history = combined_history(&harness.state).await;
        assert_eq!(history.len(), 3);
        assert!(history[0].is_final);
        assert_eq!(history[0].question, "q3");
        assert!(history[1..].iter().all(|record| !record.is_final));
    }

    #[tokio::test]
    async fn in_memory_history_is_not_duplicated_by_durable_copy() {
        let harness = Harness::new();
        create_poll(&harness.state, request("q1")).await.unwrap();
        advance_to_next_question(&harness.state, request("q2")).await.unwrap();
        harness.wait_for_records(1).await;

        let history = combined_history(&harness.state).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "q1");
    }

    #[tokio::test]
    async fn advance_with_invalid_request_keeps_current_poll() {
        let harness = Harness::new();
        create_poll(&harness.state, request("q1")).await.unwrap();

        let invalid: PollRequest =
            serde_json::from_value(serde_json::json!({"question": "", "options": ["a", "b"]}))
                .unwrap();
        assert!(advance_to_next_question(&harness.state, invalid).await.is_err());
        assert_eq!(active_poll(&harness.state).await.unwrap().question, "q1");
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn degraded_storage_skips_durable_write() {
        let harness = Harness::new();
        harness.state.set_degraded(true);
        create_poll(&harness.state, request("q1")).await.unwrap();
        end_poll(&harness.state).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.store.is_empty().await);
        assert!(harness.store.list_polls(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn realtime_history_is_not_capped_by_history_limit() {
        let harness = Harness::with_config(AppConfig {
            history_limit: 3,
            ..AppConfig::default()
        });
        create_poll(&harness.state, request("q0")).await.unwrap();
        for round in 1..5 {
            advance_to_next_question(&harness.state, request(&format!("q{round}")))
                .await
                .unwrap();
        }
        end_poll(&harness.state).await.unwrap();
        harness.wait_for_records(5).await;

        let history = combined_history(&harness.state).await;
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().filter(|record| record.is_final).count(), 1);

        let page = public_service::list_polls(&harness.state, None).await.unwrap();
        assert_eq!(page.polls.len(), 3);
    }

    #[tokio::test]
    async fn failed_durable_write_keeps_transitions_going() {
        let state = AppState::with_store(AppConfig::default(), Arc::new(FailingStore));
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.gateway().attach(Uuid::new_v4(), tx);

        create_poll(&state, request("q1")).await.unwrap();
        settle(&mut rx).await;
        advance_to_next_question(&state, request("q2")).await.unwrap();
        // Let the spawned insert run and fail.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), ["pollCreated", "pollHistoryUpdated"]);
        assert_eq!(events[0].1["question"], "q2");
        assert_eq!(events[1].1[0]["question"], "q1");
        assert_eq!(events[1].1[0]["isFinal"], false);
        assert_eq!(active_poll(&state).await.unwrap().question, "q2");
        assert_eq!(state.session().lock().await.state.history().len(), 1);

        let history = combined_history(&state).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "q1");

        end_poll(&state).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(names(&drain(&mut rx)).contains(&"pollResults"));
        assert!(active_poll(&state).await.is_none());
    }

    #[tokio::test]
    async fn persist_record_reports_insert_failure() {
        let poll = ActivePoll::start(
            PollDraft {
                question: "q1".into(),
                options: vec!["a".into(), "b".into()],
                duration_secs: 30,
                correct_answer: None,
            },
            now_ms(),
        );
        let record = CompletedPoll::from_active(&poll, true);

        let err = persist_record(&FailingStore, record).await.unwrap_err();
        match err {
            PollError::Persistence(source) => {
                assert_eq!(source.operation(), StorageOperation::Insert)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn force_broadcast_requires_teacher() {
        let harness = Harness::new();
        let (teacher, _) = harness.connect(Role::Teacher, None).await;
        let (student, mut rx) = harness.connect(Role::Student, Some("alice")).await;
        create_poll(&harness.state, request("q1")).await.unwrap();
        settle(&mut rx).await;

        force_broadcast(&harness.state, student).await;
        assert!(names(&drain(&mut rx)).is_empty());

        force_broadcast(&harness.state, teacher).await;
        assert_eq!(names(&drain(&mut rx)), ["pollCreated"]);
    }

    #[tokio::test]
    async fn preparing_next_question_only_while_active() {
        let harness = Harness::new();
        let (_, mut rx) = harness.connect(Role::Student, Some("alice")).await;

        prepare_next_question(&harness.state).await;
        assert!(drain(&mut rx).is_empty());

        create_poll(&harness.state, request("q1")).await.unwrap();
        settle(&mut rx).await;
        prepare_next_question(&harness.state).await;
        assert_eq!(names(&drain(&mut rx)), ["preparingNextQuestion"]);
    }
}
