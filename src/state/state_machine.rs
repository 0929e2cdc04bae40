use thiserror::Error;

/// Phases the poll session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No poll is open; the teacher can create one.
    Idle,
    /// A poll is open and accepting answers.
    Active,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Teacher opens a new poll from the idle state.
    Create,
    /// Teacher moves on to the next question, closing the current one if any.
    Advance,
    /// Teacher ends the session, closing the current poll.
    End,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: PollPhase,
    /// The event that cannot be applied from this phase.
    pub event: PollEvent,
}

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Phase the state machine is currently in.
    pub from: PollPhase,
    /// Phase the state machine will transition to.
    pub to: PollPhase,
    /// Event that triggered this transition.
    pub event: PollEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
}

/// Error returned when a plan no longer matches the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// State machine phase changed since the plan was created.
    #[error("phase changed since planning (expected {expected:?}, found {actual:?})")]
    PhaseMismatch {
        /// Phase when plan was created.
        expected: PollPhase,
        /// Current phase.
        actual: PollPhase,
    },
    /// State machine version changed since the plan was created.
    #[error("version changed since planning (expected {expected}, found {actual})")]
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// State machine implementing the poll lifecycle.
///
/// Callers plan a transition first, perform the side effects that depend on it, and only then
/// apply the plan, so a failed validation never leaves the phase half-updated.
#[derive(Debug, Clone)]
pub struct PollStateMachine {
    phase: PollPhase,
    version: usize,
}

impl Default for PollStateMachine {
    fn default() -> Self {
        Self {
            phase: PollPhase::Idle,
            version: 0,
        }
    }
}

impl PollStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    pub fn is_active(&self) -> bool {
        self.phase == PollPhase::Active
    }

    /// Validate that `event` can be applied from the current phase.
    pub fn plan(&self, event: PollEvent) -> Result<Plan, InvalidTransition> {
        let to = self.compute_transition(event)?;
        Ok(Plan {
            from: self.phase,
            to,
            event,
            version_next: self.version + 1,
        })
    }

    /// Apply a previously computed plan and return the new phase.
    pub fn apply(&mut self, plan: Plan) -> Result<PollPhase, ApplyError> {
        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        Ok(self.phase)
    }

    fn compute_transition(&self, event: PollEvent) -> Result<PollPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (PollPhase::Idle, PollEvent::Create) => PollPhase::Active,
            (_, PollEvent::Advance) => PollPhase::Active,
            (PollPhase::Active, PollEvent::End) => PollPhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
