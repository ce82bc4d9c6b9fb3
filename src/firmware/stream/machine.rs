use statig::blocking::{IntoStateMachineExt as _, StateMachine};
use statig::prelude::*;

/// Everything the session I/O loop can observe, reduced to machine events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionEvent {
    CredentialsAccepted,
    CredentialsRejected,
    /// A part was fully written; resets the consecutive-failure count.
    FrameStreamed,
    /// Empty/garbage frame, released without being forwarded. Not a failure.
    FrameInvalid,
    /// Acquire failed; counts toward the failure budget.
    CaptureFailed,
    /// The client is gone. The expected way a stream ends.
    WriteFailed,
    ShutdownRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionPhase {
    Authenticating,
    Streaming,
    Closed,
    Failed,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionMachine {
    failure_budget: u8,
    consecutive_failures: u8,
    frames_streamed: u32,
}

#[state_machine(
    initial = "State::authenticating()",
    state(derive(Debug, Clone, Copy, PartialEq, Eq))
)]
impl SessionMachine {
    #[state]
    fn authenticating(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::CredentialsAccepted => Transition(State::streaming()),
            SessionEvent::CredentialsRejected => Transition(State::failed()),
            SessionEvent::WriteFailed | SessionEvent::ShutdownRequested => {
                Transition(State::closed())
            }
            _ => Handled,
        }
    }

    #[state]
    fn streaming(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::FrameStreamed => {
                self.consecutive_failures = 0;
                self.frames_streamed = self.frames_streamed.saturating_add(1);
                Handled
            }
            SessionEvent::FrameInvalid => Handled,
            SessionEvent::CaptureFailed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.failure_budget {
                    Transition(State::failed())
                } else {
                    Handled
                }
            }
            SessionEvent::WriteFailed | SessionEvent::ShutdownRequested => {
                Transition(State::closed())
            }
            _ => Handled,
        }
    }

    // Terminal; every event is ignored.
    #[state]
    fn closed(&mut self, event: &SessionEvent) -> Outcome<State> {
        let _ = event;
        Handled
    }

    #[state]
    fn failed(&mut self, event: &SessionEvent) -> Outcome<State> {
        let _ = event;
        Handled
    }
}

/// Owning wrapper that dispatches events and answers phase queries, keeping
/// the statig plumbing out of the session I/O loop.
pub(crate) struct SessionEngine {
    machine: StateMachine<SessionMachine>,
}

impl SessionEngine {
    pub(crate) fn new(failure_budget: u8) -> Self {
        let machine = SessionMachine {
            // A zero budget would fail the session on its first hiccup
            // before a single retry; clamp to one.
            failure_budget: failure_budget.max(1),
            consecutive_failures: 0,
            frames_streamed: 0,
        };
        Self {
            machine: machine.state_machine(),
        }
    }

    pub(crate) fn apply(&mut self, event: SessionEvent) -> SessionPhase {
        self.machine.handle(&event);
        self.phase()
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        let state = *self.machine.state();
        if state == State::authenticating() {
            SessionPhase::Authenticating
        } else if state == State::streaming() {
            SessionPhase::Streaming
        } else if state == State::closed() {
            SessionPhase::Closed
        } else {
            SessionPhase::Failed
        }
    }

    pub(crate) fn frames_streamed(&self) -> u32 {
        self.machine.inner().frames_streamed
    }

    pub(crate) fn consecutive_failures(&self) -> u8 {
        self.machine.inner().consecutive_failures
    }
}
