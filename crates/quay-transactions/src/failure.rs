//! # Failure Translator
//!
//! Maps coordinator outcomes and link failures onto caller-visible errors and
//! the recovery the context must perform before returning.
//!
//! | Trigger | Surfaced as | Recovery |
//! |---|---|---|
//! | Declare not answered with `declared` | `DeclareFailed` | none (caller retries) |
//! | Commit discharge not `accepted` | `RolledBack` | redeclare |
//! | Rollback discharge not `accepted` | `RollbackFailed` | redeclare |
//! | Discharge timed out | `DischargeTimeout` | reattach + redeclare |
//! | Coordinator link lost | `RolledBack` at next commit, nothing at rollback | reattach + redeclare |
//! | Session close | nothing | none |

use crate::domain::errors::{CoordinatorError, FailureCause, TransactionError};
use shared_types::outcomes::{ErrorCondition, Outcome};

/// The call that hit the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Declare,
    Commit,
    Rollback,
    Close,
}

impl Boundary {
    pub fn name(&self) -> &'static str {
        match self {
            Boundary::Declare => "declare",
            Boundary::Commit => "commit",
            Boundary::Rollback => "rollback",
            Boundary::Close => "close",
        }
    }
}

/// What the context does before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Declare the next epoch on the existing link.
    Redeclare,
    /// Discard the link, attach a new one and declare.
    ReattachAndRedeclare,
}

/// Translation of one boundary result.
#[derive(Debug)]
pub struct Verdict {
    /// Error for the caller, if the boundary failed.
    pub error: Option<TransactionError>,
    pub recovery: Recovery,
    /// Metric label for the discharge result.
    pub outcome: &'static str,
}

/// Stateless mapping from coordinator results to verdicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureTranslator;

impl FailureTranslator {
    /// A failed declare. Link-fatal errors still require a fresh link.
    pub fn declare_failed(error: &CoordinatorError) -> Verdict {
        Verdict {
            error: Some(TransactionError::DeclareFailed(error.cause())),
            recovery: if error.is_link_fatal() {
                Recovery::ReattachAndRedeclare
            } else {
                Recovery::None
            },
            outcome: label_error(error),
        }
    }

    /// Result of a discharge issued by `boundary`.
    pub fn discharge(boundary: Boundary, result: Result<Outcome, CoordinatorError>) -> Verdict {
        let (cause, recovery, outcome) = match result {
            Ok(Outcome::Accepted) => {
                let recovery = match boundary {
                    Boundary::Close => Recovery::None,
                    _ => Recovery::Redeclare,
                };
                return Verdict {
                    error: None,
                    recovery,
                    outcome: "accepted",
                };
            }
            Ok(other) => {
                let label = other.kind().name();
                let cause = match other {
                    Outcome::Rejected { error } => FailureCause::Rejected(error),
                    other => FailureCause::UnexpectedOutcome(other.to_string()),
                };
                (cause, Recovery::Redeclare, label)
            }
            Err(CoordinatorError::Timeout(after)) if boundary != Boundary::Close => {
                return Verdict {
                    error: Some(TransactionError::DischargeTimeout(after)),
                    recovery: Recovery::ReattachAndRedeclare,
                    outcome: "timeout",
                };
            }
            Err(error) => {
                let recovery = if error.is_link_fatal() {
                    Recovery::ReattachAndRedeclare
                } else {
                    Recovery::Redeclare
                };
                (error.cause(), recovery, label_error(&error))
            }
        };

        let error = match boundary {
            Boundary::Commit => Some(TransactionError::RolledBack(cause)),
            Boundary::Rollback => Some(TransactionError::RollbackFailed(cause)),
            Boundary::Declare => Some(TransactionError::DeclareFailed(cause)),
            // Close ignores the outcome entirely.
            Boundary::Close => None,
        };
        let recovery = match boundary {
            Boundary::Close => Recovery::None,
            _ => recovery,
        };

        Verdict {
            error,
            recovery,
            outcome,
        }
    }

    /// The coordinator link died while the epoch was open.
    ///
    /// A commit cannot have taken effect, so it reports a rollback. A
    /// rollback is exactly what happened, so it succeeds.
    pub fn link_lost(boundary: Boundary, condition: Option<ErrorCondition>) -> Verdict {
        let error = match boundary {
            Boundary::Commit => Some(TransactionError::RolledBack(FailureCause::LinkLost(condition))),
            Boundary::Declare => Some(TransactionError::DeclareFailed(FailureCause::LinkLost(condition))),
            Boundary::Rollback | Boundary::Close => None,
        };
        let recovery = match boundary {
            Boundary::Close => Recovery::None,
            _ => Recovery::ReattachAndRedeclare,
        };
        Verdict {
            error,
            recovery,
            outcome: "link_lost",
        }
    }
}

fn label_error(error: &CoordinatorError) -> &'static str {
    match error {
        CoordinatorError::LinkClosed(_) => "link_lost",
        CoordinatorError::Timeout(_) => "timeout",
        CoordinatorError::Rejected(_) => "rejected",
        CoordinatorError::UnexpectedState(_) => "unexpected",
        CoordinatorError::RequestInFlight(_) => "abandoned",
        CoordinatorError::Transport(_) => "transport",
    }
}
