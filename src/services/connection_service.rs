//! Connection lifecycle: join, disconnect, kick and per-connection queries.

use tracing::info;

use crate::{
    dto::{
        poll::PollSnapshot,
        ws::{DebugInfo, JoinRequest},
    },
    error::PollError,
    services::{poll_events, poll_service},
    state::{ConnectionId, Role, SharedState, poll::now_ms},
};

/// Replay the active poll to a freshly accepted transport connection.
pub async fn sync_connection(state: &SharedState, id: ConnectionId) {
    let session = state.session().lock().await;
    if let Some(poll) = session.state.active_poll() {
        info!(connection = %id, "sending active poll to new connection");
        poll_events::send_poll_created(state, id, poll);
    }
}

/// Register the connection's role and name, then bring it up to date.
///
/// Teachers receive the roster and the combined history; students are announced to teachers.
/// Every joiner gets either the active poll with its countdown adjusted, or `noActivePoll`.
pub async fn join(state: &SharedState, id: ConnectionId, request: JoinRequest) {
    let role = {
        let mut registry = state.registry().write().await;
        let outcome = registry.join(id, request.role, request.name);
        let entry = &outcome.entry;
        info!(connection = %id, role = ?entry.role, name = ?entry.name, "client joined");

        if outcome.changed {
            let dropped = outcome
                .replaced
                .as_ref()
                .and_then(|replaced| replaced.name.as_deref())
                .filter(|name| !registry.roster().iter().any(|rostered| rostered == name));
            if let Some(name) = dropped {
                poll_events::notify_teachers_student_left(state, &registry, name);
            }

            if entry.role == Role::Student {
                if let Some(name) = entry.name.as_deref() {
                    poll_events::notify_teachers_student_joined(state, &registry, name);
                }
                poll_events::notify_teachers_student_list(state, &registry);
            }
        }

        if entry.role == Role::Teacher {
            poll_events::send_student_list(state, id, registry.roster());
        }
        entry.role
    };

    {
        let session = state.session().lock().await;
        match session.state.active_poll() {
            Some(poll) => poll_events::send_poll_created(state, id, poll),
            None => poll_events::send_no_active_poll(state, id),
        }
    }
    poll_service::broadcast_stats(state).await;

    if role == Role::Teacher {
        send_poll_history(state, id).await;
    }
}

/// Forget a closed connection and tell teachers when a student left.
pub async fn disconnect(state: &SharedState, id: ConnectionId) {
    state.gateway().detach(id);

    {
        let mut registry = state.registry().write().await;
        match registry.disconnect(id) {
            Some(entry) => {
                info!(connection = %id, role = ?entry.role, name = ?entry.name, "client disconnected");
                if entry.role == Role::Student {
                    let departed = entry
                        .name
                        .as_deref()
                        .filter(|name| !registry.roster().iter().any(|rostered| rostered == name));
                    if let Some(name) = departed {
                        poll_events::notify_teachers_student_left(state, &registry, name);
                    }
                    poll_events::notify_teachers_student_list(state, &registry);
                }
            }
            None => info!(connection = %id, "connection already removed (kicked or never joined)"),
        }
    }

    poll_service::broadcast_stats(state).await;
}

/// Remove a student by name and close every connection bound to it.
///
/// Only teachers may kick; others get [`PollError::Authorization`].
pub async fn kick_student(
    state: &SharedState,
    requester: ConnectionId,
    name: &str,
) -> Result<(), PollError> {
    {
        let mut registry = state.registry().write().await;
        if !registry.is_teacher(requester) {
            return Err(PollError::Authorization(
                "Only teachers can kick students".into(),
            ));
        }

        let name = name.trim();
        let kicked = registry.kick(name);
        info!(
            student = %name,
            connections = kicked.len(),
            requested_by = %requester,
            "kicking student"
        );
        for id in kicked {
            poll_events::send_kicked(state, id);
            state.gateway().terminate(id);
        }
        poll_events::notify_teachers_student_list(state, &registry);
    }

    poll_service::broadcast_stats(state).await;
    Ok(())
}

/// Send the student roster to one connection.
pub async fn send_student_list(state: &SharedState, id: ConnectionId) {
    let registry = state.registry().read().await;
    poll_events::send_student_list(state, id, registry.roster());
}

/// Send the combined poll history to one connection.
pub async fn send_poll_history(state: &SharedState, id: ConnectionId) {
    let history = poll_service::combined_history(state).await;
    poll_events::send_history(state, id, &history);
}

/// Send a diagnostic snapshot to the requesting connection.
pub async fn send_debug_info(state: &SharedState, id: ConnectionId) {
    let active_poll = poll_service::active_poll(state)
        .await
        .map(|poll| PollSnapshot::at(&poll, now_ms()));

    let info = {
        let registry = state.registry().read().await;
        DebugInfo {
            socket_id: id,
            active_poll,
            connected_clients: state.gateway().connection_count(),
            your_role: match registry.role(id) {
                Some(Role::Teacher) => "teacher".into(),
                Some(Role::Student) => "student".into(),
                None => "unknown".into(),
            },
            student_names: registry.roster().to_vec(),
        }
    };

    poll_events::send_debug_info(state, id, &info);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::InMemoryPollStore,
        state::{
            AppState,
            poll::{ActivePoll, PollDraft},
            state_machine::PollEvent,
        },
    };

    fn state() -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(InMemoryPollStore::new()))
    }

    fn attach(state: &SharedState) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.gateway().attach(id, tx);
        (id, rx)
    }

    fn join_request(role: Role, name: Option<&str>) -> JoinRequest {
        JoinRequest {
            role,
            name: name.map(Into::into),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<(String, Value)> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            match message {
                Message::Text(text) => {
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    events.push((
                        value["event"].as_str().unwrap().to_owned(),
                        value["data"].clone(),
                    ));
                }
                Message::Close(_) => events.push(("<close>".into(), Value::Null)),
                _ => {}
            }
        }
        events
    }

    fn names(events: &[(String, Value)]) -> Vec<&str> {
        events.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Open a poll directly on the session, without the background history broadcast.
    async fn open_poll(state: &SharedState) {
        let mut session = state.session().lock().await;
        let plan = session.machine.plan(PollEvent::Create).unwrap();
        let draft = PollDraft {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            duration_secs: 60,
            correct_answer: None,
        };
        session
            .state
            .set_active_poll(Some(ActivePoll::start(draft, now_ms())));
        session.machine.apply(plan).unwrap();
    }

    #[tokio::test]
    async fn teacher_join_gets_roster_poll_state_and_history() {
        let state = state();
        let (student, _student_rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("alice"))).await;

        let (teacher, mut rx) = attach(&state);
        join(&state, teacher, join_request(Role::Teacher, None)).await;

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            ["studentList", "noActivePoll", "stats", "pollHistory"]
        );
        assert_eq!(events[0].1, serde_json::json!(["alice"]));
        assert_eq!(events[2].1["connectedStudents"], 1);
        assert_eq!(events[2].1["connectedTeachers"], 1);
    }

    #[tokio::test]
    async fn student_join_is_announced_to_teachers() {
        let state = state();
        let (teacher, mut teacher_rx) = attach(&state);
        join(&state, teacher, join_request(Role::Teacher, None)).await;
        drain(&mut teacher_rx);

        let (student, mut student_rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("alice"))).await;

        let teacher_events = drain(&mut teacher_rx);
        assert_eq!(names(&teacher_events), ["studentJoined", "studentList", "stats"]);
        assert_eq!(teacher_events[0].1, "alice");
        assert_eq!(names(&drain(&mut student_rx)), ["noActivePoll", "stats"]);
    }

    #[tokio::test]
    async fn late_joiner_receives_adjusted_countdown() {
        let state = state();
        open_poll(&state).await;
        {
            let mut session = state.session().lock().await;
            let mut poll = session.state.active_poll().cloned().unwrap();
            poll.start_timestamp_ms -= 20_000;
            session.state.set_active_poll(Some(poll));
        }

        let (student, mut rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("bob"))).await;

        let events = drain(&mut rx);
        let (name, data) = &events[0];
        assert_eq!(name, "pollCreated");
        assert_eq!(data["duration"], 40);
        assert_eq!(data["totalDuration"], 60);
    }

    #[tokio::test]
    async fn rejoining_with_the_same_name_keeps_one_roster_entry() {
        let state = state();
        let (first, _rx1) = attach(&state);
        let (second, _rx2) = attach(&state);
        join(&state, first, join_request(Role::Student, Some("alice"))).await;
        join(&state, second, join_request(Role::Student, Some("alice"))).await;

        assert_eq!(state.registry().read().await.roster(), ["alice"]);
    }

    #[tokio::test]
    async fn disconnect_notifies_teachers() {
        let state = state();
        let (teacher, mut teacher_rx) = attach(&state);
        join(&state, teacher, join_request(Role::Teacher, None)).await;
        let (student, _student_rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("alice"))).await;
        drain(&mut teacher_rx);

        disconnect(&state, student).await;

        let events = drain(&mut teacher_rx);
        assert_eq!(names(&events), ["studentLeft", "studentList", "stats"]);
        assert_eq!(events[0].1, "alice");
        assert_eq!(events[1].1, serde_json::json!([]));
        assert_eq!(events[2].1["connectedStudents"], 0);
    }

    #[tokio::test]
    async fn kick_closes_the_student_connection() {
        let state = state();
        let (teacher, mut teacher_rx) = attach(&state);
        join(&state, teacher, join_request(Role::Teacher, None)).await;
        let (student, mut student_rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("mallory"))).await;
        drain(&mut teacher_rx);
        drain(&mut student_rx);

        kick_student(&state, teacher, "mallory").await.unwrap();

        let student_events = drain(&mut student_rx);
        assert_eq!(names(&student_events)[..2], ["kicked", "<close>"]);
        let teacher_events = drain(&mut teacher_rx);
        assert_eq!(names(&teacher_events), ["studentList", "stats"]);
        assert!(state.registry().read().await.roster().is_empty());
    }

    #[tokio::test]
    async fn students_cannot_kick() {
        let state = state();
        let (student, _rx) = attach(&state);
        join(&state, student, join_request(Role::Student, Some("eve"))).await;
        let (victim, _victim_rx) = attach(&state);
        join(&state, victim, join_request(Role::Student, Some("bob"))).await;

        let err = kick_student(&state, student, "bob").await.unwrap_err();
        assert_eq!(err.to_string(), "Only teachers can kick students");
        assert_eq!(state.registry().read().await.roster(), ["eve", "bob"]);
    }

    #[tokio::test]
    async fn debug_info_reports_requester_role() {
        let state = state();
        let (id, mut rx) = attach(&state);
        send_debug_info(&state, id).await;

        let events = drain(&mut rx);
        assert_eq!(events[0].0, "debugInfo");
        assert_eq!(events[0].1["yourRole"], "unknown");
        assert_eq!(events[0].1["connectedClients"], 1);
        assert_eq!(events[0].1["activePoll"], Value::Null);
    }

    #[tokio::test]
    async fn sync_connection_replays_only_active_poll() {
        let state = state();
        let (id, mut rx) = attach(&state);
        sync_connection(&state, id).await;
        assert!(drain(&mut rx).is_empty());

        open_poll(&state).await;
        sync_connection(&state, id).await;
        assert_eq!(names(&drain(&mut rx)), ["pollCreated"]);
    }
}
