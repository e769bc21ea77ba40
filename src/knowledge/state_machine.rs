//! Legal transitions of a record's processing status.
//!
//! PROCESSING is the only state that moves. SUCCESS and FAILED are terminal: re-entering the
//! same terminal state is a no-op, and crossing to the opposite terminal state is rejected.

use crate::knowledge::types::ProcessingStatus;
use thiserror::Error;

/// Terminal outcome reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Extraction succeeded.
    Success,
    /// Extraction failed.
    Failure,
}

impl Outcome {
    /// Status a record takes when this outcome is applied.
    pub fn target(self) -> ProcessingStatus {
        match self {
            Self::Success => ProcessingStatus::Success,
            Self::Failure => ProcessingStatus::Failed,
        }
    }
}

/// Accepted result of applying an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record should move to the given terminal status.
    Advance(ProcessingStatus),
    /// The record already holds this terminal status; nothing to do.
    AlreadyApplied(ProcessingStatus),
}

/// A terminal record received the opposite terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal transition from {from} to {to}")]
pub struct IllegalTransition {
    /// Status the record currently holds.
    pub from: ProcessingStatus,
    /// Status the event asked for.
    pub to: ProcessingStatus,
}

/// Decide how `outcome` applies to a record currently in `current`.
pub fn transition(current: ProcessingStatus, outcome: Outcome) -> Result<Transition, IllegalTransition> {
    let target = outcome.target();
    match current {
        ProcessingStatus::Processing => Ok(Transition::Advance(target)),
        terminal if terminal == target => Ok(Transition::AlreadyApplied(terminal)),
        terminal => Err(IllegalTransition {
            from: terminal,
            to: target,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [ProcessingStatus; 3] = [
        ProcessingStatus::Processing,
        ProcessingStatus::Success,
        ProcessingStatus::Failed,
    ];

    #[test]
    fn processing_advances_to_either_terminal() {
        assert_eq!(
            transition(ProcessingStatus::Processing, Outcome::Success),
            Ok(Transition::Advance(ProcessingStatus::Success))
        );
        assert_eq!(
            transition(ProcessingStatus::Processing, Outcome::Failure),
            Ok(Transition::Advance(ProcessingStatus::Failed))
        );
    }

    #[test]
    fn repeated_terminal_outcome_is_a_no_op() {
        assert_eq!(
            transition(ProcessingStatus::Success, Outcome::Success),
            Ok(Transition::AlreadyApplied(ProcessingStatus::Success))
        );
        assert_eq!(
            transition(ProcessingStatus::Failed, Outcome::Failure),
            Ok(Transition::AlreadyApplied(ProcessingStatus::Failed))
        );
    }

    #[test]
    fn opposite_terminal_outcome_is_rejected() {
        let err = transition(ProcessingStatus::Success, Outcome::Failure).unwrap_err();
        assert_eq!(err.from, ProcessingStatus::Success);
        assert_eq!(err.to, ProcessingStatus::Failed);
        assert!(transition(ProcessingStatus::Failed, Outcome::Success).is_err());
    }

    #[test]
    fn no_sequence_leaves_a_terminal_state() {
        // Exhaustive over short event sequences: once terminal, the status never changes.
        let outcomes = [Outcome::Success, Outcome::Failure];
        for first in outcomes {
            for second in outcomes {
                for third in outcomes {
                    let mut status = ProcessingStatus::Processing;
                    let mut resolved: Option<ProcessingStatus> = None;
                    for outcome in [first, second, third] {
                        if let Ok(Transition::Advance(next)) = transition(status, outcome) {
                            status = next;
                        }
                        if let Some(terminal) = resolved {
                            assert_eq!(status, terminal);
                        }
                        if status.is_terminal() {
                            resolved = Some(status);
                        }
                    }
                    assert_eq!(status, first.target());
                }
            }
        }
    }

    #[test]
    fn nothing_returns_to_processing() {
        for status in ALL_STATUSES {
            for outcome in [Outcome::Success, Outcome::Failure] {
                if let Ok(Transition::Advance(next)) = transition(status, outcome) {
                    assert_ne!(next, ProcessingStatus::Processing);
                }
            }
        }
    }
}
