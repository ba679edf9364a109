//! Error types for transaction coordination
//!
//! `TransactionError` is what callers see. `CoordinatorError` is the
//! link-level failure of a single control request; `FailureTranslator` maps
//! one onto the other.

use crate::domain::state::IllegalTransition;
use shared_types::entities::{DeliveryId, LinkHandle};
use shared_types::outcomes::ErrorCondition;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Caller-facing exception class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The epoch's work was discarded by the coordinator.
    TransactionRolledBack,
    /// Any other transaction failure.
    Jms,
}

/// Why a boundary or declare failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// Coordinator answered with `rejected`.
    Rejected(Option<ErrorCondition>),
    /// Coordinator answered with a state that does not fit the request.
    UnexpectedOutcome(String),
    /// Coordinator link closed by the remote or the connection.
    LinkLost(Option<ErrorCondition>),
    /// No reply within the request timeout.
    Timeout(Duration),
    /// An earlier request on the same link was abandoned mid-flight.
    RequestInFlight,
    Transport(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Rejected(Some(error)) => write!(f, "rejected by coordinator: {}", error),
            FailureCause::Rejected(None) => f.write_str("rejected by coordinator"),
            FailureCause::UnexpectedOutcome(state) => write!(f, "unexpected coordinator reply: {}", state),
            FailureCause::LinkLost(Some(error)) => write!(f, "coordinator link closed: {}", error),
            FailureCause::LinkLost(None) => f.write_str("coordinator link closed"),
            FailureCause::Timeout(after) => write!(f, "no coordinator reply within {:?}", after),
            FailureCause::RequestInFlight => f.write_str("previous coordinator request abandoned"),
            FailureCause::Transport(reason) => write!(f, "transport failure: {}", reason),
        }
    }
}

/// Errors surfaced by transaction boundaries and enlistment.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Commit did not take effect; nothing enlisted in the epoch survived.
    #[error("Transaction rolled back: {0}")]
    RolledBack(FailureCause),

    /// No usable epoch could be established.
    #[error("Transaction declare failed: {0}")]
    DeclareFailed(FailureCause),

    #[error("Transaction rollback failed: {0}")]
    RollbackFailed(FailureCause),

    #[error("Discharge timed out after {0:?}")]
    DischargeTimeout(Duration),

    #[error(transparent)]
    IllegalState(#[from] IllegalTransition),

    #[error("Session closed")]
    SessionClosed,

    #[error("Unknown link: {0}")]
    UnknownLink(LinkHandle),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl TransactionError {
    /// Map onto the caller's exception taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            TransactionError::RolledBack(_) => ErrorClass::TransactionRolledBack,
            _ => ErrorClass::Jms,
        }
    }
}

/// Failure of a single coordinator request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Coordinator link closed{}", fmt_condition(.0))]
    LinkClosed(Option<ErrorCondition>),

    #[error("Coordinator did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Coordinator rejected request{}", fmt_condition(.0))]
    Rejected(Option<ErrorCondition>),

    #[error("Unexpected coordinator reply: {0}")]
    UnexpectedState(String),

    #[error("Request {0} still outstanding on coordinator link")]
    RequestInFlight(DeliveryId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CoordinatorError {
    /// Whether the link must be discarded after this error.
    ///
    /// A rejected or mismatched reply still leaves a usable link.
    pub fn is_link_fatal(&self) -> bool {
        !matches!(
            self,
            CoordinatorError::Rejected(_) | CoordinatorError::UnexpectedState(_)
        )
    }

    pub fn cause(&self) -> FailureCause {
        match self {
            CoordinatorError::LinkClosed(error) => FailureCause::LinkLost(error.clone()),
            CoordinatorError::Timeout(after) => FailureCause::Timeout(*after),
            CoordinatorError::Rejected(error) => FailureCause::Rejected(error.clone()),
            CoordinatorError::UnexpectedState(state) => FailureCause::UnexpectedOutcome(state.clone()),
            CoordinatorError::RequestInFlight(_) => FailureCause::RequestInFlight,
            CoordinatorError::Transport(error) => FailureCause::Transport(error.to_string()),
        }
    }
}

fn fmt_condition(condition: &Option<ErrorCondition>) -> String {
    condition
        .as_ref()
        .map(|c| format!(": {}", c))
        .unwrap_or_default()
}

/// Failure writing a frame to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}
