//! Authoritative in-memory poll session.

use std::{collections::HashSet, sync::Arc};

use tracing::warn;

use crate::{
    dao::poll_store::PollStore,
    state::{
        poll::{ActivePoll, CompletedPoll},
        state_machine::PollStateMachine,
    },
};

/// Hot state of the current session.
///
/// Every field is read and replaced as a whole value; there is no partial-update API.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    active_poll: Option<ActivePoll>,
    answered: HashSet<String>,
    history: Vec<CompletedPoll>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_poll(&self) -> Option<&ActivePoll> {
        self.active_poll.as_ref()
    }

    pub fn set_active_poll(&mut self, poll: Option<ActivePoll>) {
        self.active_poll = poll;
    }

    /// Student identifiers that answered the active poll.
    pub fn answered(&self) -> &HashSet<String> {
        &self.answered
    }

    pub fn has_answered(&self, student_id: &str) -> bool {
        self.answered.contains(student_id)
    }

    pub fn set_answered(&mut self, answered: HashSet<String>) {
        self.answered = answered;
    }

    pub fn reset_answered(&mut self) {
        self.answered = HashSet::new();
    }

    /// Polls completed during this session, oldest first.
    pub fn history(&self) -> &[CompletedPoll] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<CompletedPoll>) {
        self.history = history;
    }

    pub fn reset_history(&mut self) {
        self.history = Vec::new();
    }
}

/// State machine and session data guarded together by a single lock.
#[derive(Debug, Default)]
pub struct PollSession {
    pub machine: PollStateMachine,
    pub state: SessionState,
}

impl PollSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merge in-memory history with durable records.
///
/// In-memory entries come first, followed by durable ones; the first occurrence of each
/// (question, timestamp) pair wins.
pub fn reconcile_history(
    in_memory: Vec<CompletedPoll>,
    durable: Vec<CompletedPoll>,
) -> Vec<CompletedPoll> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    in_memory
        .into_iter()
        .chain(durable)
        .filter(|poll| {
            let (question, timestamp) = poll.reconciliation_key();
            seen.insert((question.to_owned(), timestamp.to_owned()))
        })
        .collect()
}

/// Combined history for display: every stored record, reconciled with memory.
///
/// Store failures are logged and the in-memory history is returned on its own.
pub async fn load_combined_history(
    in_memory: Vec<CompletedPoll>,
    store: Option<Arc<dyn PollStore>>,
) -> Vec<CompletedPoll> {
    let Some(store) = store else {
        return in_memory;
    };

    match store.list_polls(None).await {
        Ok(records) => {
            let durable = records.into_iter().map(CompletedPoll::from).collect();
            reconcile_history(in_memory, durable)
        }
        Err(err) => {
            warn!(error = %err, "failed to load poll history; using in-memory history only");
            in_memory
        }
    }
}
