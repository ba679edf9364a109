//! Transaction state machine
//!
//! The context's state is a single `TxnState`; every change goes through
//! [`transition`], which rejects combinations the protocol does not allow.

use shared_types::entities::TxnId;
use std::fmt;
use thiserror::Error;

/// Why the context is in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Declare got no usable reply. The next use retries the declare.
    DeclareFailed,
    /// The coordinator link was lost while an epoch was open. Enlistments of
    /// the dead epoch are dropped until the next boundary.
    LinkLost { txn_id: Option<TxnId> },
}

/// State of the session's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnState {
    /// No transaction has been declared yet.
    Unbound,
    /// Declare sent, awaiting `Declared`.
    Declaring,
    Active(TxnId),
    /// Discharge(fail=false) in flight.
    Committing(TxnId),
    /// Discharge(fail=true) in flight.
    RollingBack(TxnId),
    Failed(FailureKind),
    Closed,
}

impl TxnState {
    pub fn name(&self) -> &'static str {
        match self {
            TxnState::Unbound => "UNBOUND",
            TxnState::Declaring => "DECLARING",
            TxnState::Active(_) => "ACTIVE",
            TxnState::Committing(_) => "COMMITTING",
            TxnState::RollingBack(_) => "ROLLING_BACK",
            TxnState::Failed(_) => "FAILED",
            TxnState::Closed => "CLOSED",
        }
    }

    /// Transaction id of the ACTIVE epoch.
    pub fn active_txn_id(&self) -> Option<&TxnId> {
        match self {
            TxnState::Active(txn_id) => Some(txn_id),
            _ => None,
        }
    }

    /// A boundary or declare was underway. Seen at the start of an operation
    /// this means the previous call was cancelled.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            TxnState::Declaring | TxnState::Committing(_) | TxnState::RollingBack(_)
        )
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnState::Active(txn_id) | TxnState::Committing(txn_id) | TxnState::RollingBack(txn_id) => {
                write!(f, "{}({})", self.name(), txn_id)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnEvent {
    /// Declare is about to be sent.
    Begin,
    Declared(TxnId),
    DeclareFailed,
    /// Send or acknowledgement within the current epoch.
    Enlist,
    Commit,
    Rollback,
    /// The discharge of a commit or rollback resolved, successfully or not.
    Discharged,
    /// Coordinator link closed.
    LinkLost,
    /// A previous call was dropped while a request was outstanding.
    Interrupted,
    Close,
}

impl TxnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TxnEvent::Begin => "begin",
            TxnEvent::Declared(_) => "declared",
            TxnEvent::DeclareFailed => "declare-failed",
            TxnEvent::Enlist => "enlist",
            TxnEvent::Commit => "commit",
            TxnEvent::Rollback => "rollback",
            TxnEvent::Discharged => "discharged",
            TxnEvent::LinkLost => "link-lost",
            TxnEvent::Interrupted => "interrupted",
            TxnEvent::Close => "close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal transaction transition: {event} in state {from}")]
pub struct IllegalTransition {
    pub from: &'static str,
    pub event: &'static str,
}

/// Compute the next state.
pub fn transition(state: &TxnState, event: TxnEvent) -> Result<TxnState, IllegalTransition> {
    use TxnState::*;

    let next = match (state, &event) {
        (Closed, _) => None,
        (_, TxnEvent::Close) => Some(Closed),

        (Unbound | Failed(FailureKind::DeclareFailed), TxnEvent::Begin) => Some(Declaring),
        (Declaring, TxnEvent::Declared(txn_id)) => Some(Active(txn_id.clone())),
        (Declaring, TxnEvent::DeclareFailed | TxnEvent::LinkLost | TxnEvent::Interrupted) => {
            Some(Failed(FailureKind::DeclareFailed))
        }

        (Active(txn_id), TxnEvent::Enlist) => Some(Active(txn_id.clone())),
        (Active(txn_id), TxnEvent::Commit) => Some(Committing(txn_id.clone())),
        (Active(txn_id), TxnEvent::Rollback) => Some(RollingBack(txn_id.clone())),
        (Active(txn_id), TxnEvent::LinkLost) => Some(Failed(FailureKind::LinkLost {
            txn_id: Some(txn_id.clone()),
        })),

        (Committing(_) | RollingBack(_), TxnEvent::Discharged) => Some(Declaring),
        (Committing(txn_id) | RollingBack(txn_id), TxnEvent::Interrupted) => {
            Some(Failed(FailureKind::LinkLost {
                txn_id: Some(txn_id.clone()),
            }))
        }

        // The dead epoch is closed by the next boundary, which then re-arms.
        (Failed(FailureKind::LinkLost { .. }), TxnEvent::Commit | TxnEvent::Rollback) => {
            Some(Declaring)
        }

        _ => None,
    };

    next.ok_or(IllegalTransition {
        from: state.name(),
        event: event.name(),
    })
}
