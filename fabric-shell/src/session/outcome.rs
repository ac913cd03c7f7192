//! Session lifecycle states and final outcome classification.

use std::fmt;
use std::time::Duration;

use crate::channel::Termination;
use crate::error::SessionError;

/// Lifecycle of a command session.
///
/// ```text
/// Opening -> ShellStarting -> Executing -> AwaitingTermination -> Succeeded
///                                  ^   |
///                                  +---+ (one step sent)
/// any non-terminal state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    ShellStarting,
    Executing,
    AwaitingTermination,
    Succeeded,
    Failed,
}

impl SessionState {
    /// State name as used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Opening => "Opening",
            SessionState::ShellStarting => "ShellStarting",
            SessionState::Executing => "Executing",
            SessionState::AwaitingTermination => "AwaitingTermination",
            SessionState::Succeeded => "Succeeded",
            SessionState::Failed => "Failed",
        }
    }

    /// Whether the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Opening, ShellStarting)
            | (ShellStarting, Executing)
            | (Executing, Executing)
            | (Executing, AwaitingTermination)
            | (AwaitingTermination, Succeeded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`, rejecting edges the lifecycle does not have.
    pub fn transition(self, next: SessionState) -> Result<SessionState, SessionError> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(SessionError::IllegalTransition {
                from: self.name(),
                to: next.name(),
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a session that reached `Succeeded`.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Everything the remote printed, in arrival order.
    pub output: String,

    /// How the remote side ended.
    pub termination: Termination,

    /// Number of script steps written.
    pub steps_sent: usize,

    /// Time from channel open to termination.
    pub elapsed: Duration,
}

impl SessionOutcome {
    /// True when success was inferred from a close without exit status.
    pub fn is_benign_termination(&self) -> bool {
        self.termination == Termination::NoExitStatus
    }
}

/// Decide the verdict for a finished session.
///
/// Exit status 0 succeeds. A close without any exit report also succeeds:
/// the device shell does not always send one. Everything else fails with
/// the output attached.
pub fn classify(
    termination: Termination,
    output: String,
    steps_sent: usize,
    elapsed: Duration,
) -> Result<SessionOutcome, SessionError> {
    match termination {
        Termination::ExitStatus(0) | Termination::NoExitStatus => Ok(SessionOutcome {
            output,
            termination,
            steps_sent,
            elapsed,
        }),
        other => Err(SessionError::TerminationFailed {
            reason: other.to_string(),
            output,
        }),
    }
}
