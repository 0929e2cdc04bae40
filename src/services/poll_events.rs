//! Named outbound events and the helpers that emit them through the broadcast gateway.

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        poll::{PollRecordResponse, PollResults, PollSnapshot},
        ws::{DebugInfo, ErrorPayload, PingPayload, ServerEvent, StatsPayload},
    },
    state::{
        ConnectionId, ConnectionRegistry, SharedState,
        poll::{ActivePoll, CompletedPoll, now_ms},
    },
};

pub const EVENT_POLL_CREATED: &str = "pollCreated";
pub const EVENT_POLL_UPDATED: &str = "pollUpdated";
pub const EVENT_POLL_RESULTS: &str = "pollResults";
pub const EVENT_POLL_TIME_UPDATE: &str = "pollTimeUpdate";
pub const EVENT_POLL_HISTORY: &str = "pollHistory";
pub const EVENT_POLL_HISTORY_UPDATED: &str = "pollHistoryUpdated";
pub const EVENT_STUDENT_LIST: &str = "studentList";
pub const EVENT_STUDENT_JOINED: &str = "studentJoined";
pub const EVENT_STUDENT_LEFT: &str = "studentLeft";
pub const EVENT_STATS: &str = "stats";
pub const EVENT_NO_ACTIVE_POLL: &str = "noActivePoll";
pub const EVENT_PREPARING_NEXT_QUESTION: &str = "preparingNextQuestion";
pub const EVENT_KICKED: &str = "kicked";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_PING: &str = "ping";
pub const EVENT_DEBUG_INFO: &str = "debugInfo";

/// Broadcast a freshly opened (or re-sent) poll to everyone.
pub fn broadcast_poll_created(state: &SharedState, poll: &ActivePoll) {
    let payload = PollSnapshot::at(poll, now_ms());
    send_all(state, EVENT_POLL_CREATED, &payload);
}

/// Replay the active poll to a single connection, with the countdown adjusted to now.
pub fn send_poll_created(state: &SharedState, id: ConnectionId, poll: &ActivePoll) {
    let payload = PollSnapshot::at(poll, now_ms());
    send_one(state, id, EVENT_POLL_CREATED, &payload);
}

pub fn send_no_active_poll(state: &SharedState, id: ConnectionId) {
    state
        .gateway()
        .emit_to_one(id, &ServerEvent::bare(EVENT_NO_ACTIVE_POLL));
}

/// Broadcast the vote counts after an accepted answer.
pub fn broadcast_poll_updated(state: &SharedState, poll: &ActivePoll) {
    let payload = PollSnapshot::at(poll, now_ms());
    send_all(state, EVENT_POLL_UPDATED, &payload);
}

/// Broadcast the final results of an ended poll.
pub fn broadcast_poll_results(state: &SharedState, poll: &ActivePoll) {
    let payload = PollResults::at(poll, now_ms());
    send_all(state, EVENT_POLL_RESULTS, &payload);
}

pub fn broadcast_time_update(state: &SharedState, remaining_secs: u32) {
    send_all(state, EVENT_POLL_TIME_UPDATE, &remaining_secs);
}

pub fn broadcast_preparing_next_question(state: &SharedState) {
    state
        .gateway()
        .emit_to_all(&ServerEvent::bare(EVENT_PREPARING_NEXT_QUESTION));
}

/// Broadcast the combined history.
pub fn broadcast_history(state: &SharedState, history: &[CompletedPoll]) {
    send_all(state, EVENT_POLL_HISTORY, &history_payload(history));
}

pub fn send_history(state: &SharedState, id: ConnectionId, history: &[CompletedPoll]) {
    send_one(state, id, EVENT_POLL_HISTORY, &history_payload(history));
}

/// Broadcast the in-memory history of the running session.
pub fn broadcast_history_updated(state: &SharedState, history: &[CompletedPoll]) {
    send_all(state, EVENT_POLL_HISTORY_UPDATED, &history_payload(history));
}

pub fn send_student_list(state: &SharedState, id: ConnectionId, roster: &[String]) {
    send_one(state, id, EVENT_STUDENT_LIST, roster);
}

pub fn notify_teachers_student_list(state: &SharedState, registry: &ConnectionRegistry) {
    send_teachers(state, registry, EVENT_STUDENT_LIST, registry.roster());
}

pub fn notify_teachers_student_joined(
    state: &SharedState,
    registry: &ConnectionRegistry,
    name: &str,
) {
    send_teachers(state, registry, EVENT_STUDENT_JOINED, name);
}

pub fn notify_teachers_student_left(
    state: &SharedState,
    registry: &ConnectionRegistry,
    name: &str,
) {
    send_teachers(state, registry, EVENT_STUDENT_LEFT, name);
}

pub fn broadcast_stats(state: &SharedState, stats: StatsPayload) {
    send_all(state, EVENT_STATS, &stats);
}

pub fn send_kicked(state: &SharedState, id: ConnectionId) {
    state
        .gateway()
        .emit_to_one(id, &ServerEvent::bare(EVENT_KICKED));
}

/// Report a failed request to the connection that sent it.
pub fn send_error(state: &SharedState, id: ConnectionId, message: impl Into<String>) {
    let payload = ErrorPayload {
        message: message.into(),
    };
    send_one(state, id, EVENT_ERROR, &payload);
}

pub fn broadcast_ping(state: &SharedState, time: String) {
    send_all(state, EVENT_PING, &PingPayload { time });
}

pub fn send_debug_info(state: &SharedState, id: ConnectionId, info: &DebugInfo) {
    send_one(state, id, EVENT_DEBUG_INFO, info);
}

fn history_payload(history: &[CompletedPoll]) -> Vec<PollRecordResponse> {
    history.iter().cloned().map(PollRecordResponse::from).collect()
}

fn event<T>(name: &'static str, payload: &T) -> Option<ServerEvent>
where
    T: ?Sized + Serialize,
{
    match ServerEvent::json(name, payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize event payload");
            None
        }
    }
}

fn send_all<T>(state: &SharedState, name: &'static str, payload: &T)
where
    T: ?Sized + Serialize,
{
    if let Some(event) = event(name, payload) {
        state.gateway().emit_to_all(&event);
    }
}

fn send_one<T>(state: &SharedState, id: ConnectionId, name: &'static str, payload: &T)
where
    T: ?Sized + Serialize,
{
    if let Some(event) = event(name, payload) {
        state.gateway().emit_to_one(id, &event);
    }
}

fn send_teachers<T>(
    state: &SharedState,
    registry: &ConnectionRegistry,
    name: &'static str,
    payload: &T,
) where
    T: ?Sized + Serialize,
{
    if let Some(event) = event(name, payload) {
        state.gateway().emit_to_teachers(registry, &event);
    }
}
