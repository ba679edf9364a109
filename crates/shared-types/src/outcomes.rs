//! # Outcomes and Delivery States
//!
//! The closed set of terminal outcomes (AMQP 1.0 section 3.4) plus the two
//! transaction-specific delivery states `declared` and `transactional-state`
//! (section 4.5).

use crate::entities::TxnId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptor symbols, used when advertising supported outcomes and in logs.
pub mod descriptors {
    pub const ACCEPTED: &str = "amqp:accepted:list";
    pub const REJECTED: &str = "amqp:rejected:list";
    pub const RELEASED: &str = "amqp:released:list";
    pub const MODIFIED: &str = "amqp:modified:list";
    pub const DECLARE: &str = "amqp:declare:list";
    pub const DISCHARGE: &str = "amqp:discharge:list";
    pub const DECLARED: &str = "amqp:declared:list";
    pub const TRANSACTIONAL_STATE: &str = "amqp:transactional-state:list";
}

/// Error condition attached to a rejected outcome or a closing detach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCondition {
    /// Symbolic condition, e.g. `amqp:transaction:rollback`.
    pub condition: String,
    pub description: Option<String>,
}

impl ErrorCondition {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.condition, description),
            None => f.write_str(&self.condition),
        }
    }
}

/// Terminal outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Accepted,
    Rejected {
        error: Option<ErrorCondition>,
    },
    Released,
    Modified {
        delivery_failed: Option<bool>,
        undeliverable_here: Option<bool>,
    },
}

impl Outcome {
    /// The default outcome advertised on a transacted consumer source.
    pub fn delivery_failed() -> Self {
        Outcome::Modified {
            delivery_failed: Some(true),
            undeliverable_here: None,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Accepted => OutcomeKind::Accepted,
            Outcome::Rejected { .. } => OutcomeKind::Rejected,
            Outcome::Released => OutcomeKind::Released,
            Outcome::Modified { .. } => OutcomeKind::Modified,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rejected { error: Some(error) } => write!(f, "rejected: {}", error),
            other => f.write_str(other.kind().name()),
        }
    }
}

/// Outcome discriminant without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Accepted,
    Rejected,
    Released,
    Modified,
}

impl OutcomeKind {
    /// Every outcome a transacted consumer accepts, in advertised order.
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Accepted,
        OutcomeKind::Rejected,
        OutcomeKind::Released,
        OutcomeKind::Modified,
    ];

    pub fn descriptor(&self) -> &'static str {
        match self {
            OutcomeKind::Accepted => descriptors::ACCEPTED,
            OutcomeKind::Rejected => descriptors::REJECTED,
            OutcomeKind::Released => descriptors::RELEASED,
            OutcomeKind::Modified => descriptors::MODIFIED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutcomeKind::Accepted => "accepted",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::Released => "released",
            OutcomeKind::Modified => "modified",
        }
    }
}

/// Delivery state wrapper linking a transfer or disposition to a transaction.
///
/// A producer transfer proposes `outcome: None`; only the remote decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalState {
    pub txn_id: TxnId,
    pub outcome: Option<Outcome>,
}

/// Delivery state carried on transfers and dispositions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Reply to a `Declare`: the allocated transaction id.
    Declared { txn_id: TxnId },
    Outcome(Outcome),
    Transactional(TransactionalState),
}

impl DeliveryState {
    /// Transaction this state belongs to, if any.
    pub fn txn_id(&self) -> Option<&TxnId> {
        match self {
            DeliveryState::Declared { txn_id } => Some(txn_id),
            DeliveryState::Transactional(state) => Some(&state.txn_id),
            DeliveryState::Outcome(_) => None,
        }
    }

    pub fn descriptor(&self) -> &'static str {
        match self {
            DeliveryState::Declared { .. } => descriptors::DECLARED,
            DeliveryState::Outcome(outcome) => outcome.kind().descriptor(),
            DeliveryState::Transactional(_) => descriptors::TRANSACTIONAL_STATE,
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Declared { txn_id } => write!(f, "declared({})", txn_id),
            DeliveryState::Outcome(outcome) => write!(f, "{}", outcome),
            DeliveryState::Transactional(state) => match &state.outcome {
                Some(outcome) => write!(f, "transactional({}, {})", state.txn_id, outcome),
                None => write!(f, "transactional({})", state.txn_id),
            },
        }
    }
}
