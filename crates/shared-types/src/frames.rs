//! # Performatives
//!
//! The frames exchanged between a session and its peer, reduced to the
//! fields the transaction layer reads or writes.
//!
//! ```text
//! Attach ──► link established (coordinator target or message node)
//! Transfer ─► message or coordinator control body (Declare / Discharge)
//! Disposition ─► outcome for one or a range of deliveries
//! Flow ─────► link credit, optionally drain
//! Detach ───► link closed, optionally with an error
//! ```

use crate::entities::{DeliveryId, LinkHandle, Role, TxnId};
use crate::outcomes::{DeliveryState, ErrorCondition, Outcome, OutcomeKind};
use serde::{Deserialize, Serialize};

/// Capability requested from a coordinator that supports local transactions.
pub const LOCAL_TRANSACTIONS: &str = "amqp:local-transactions";

// =============================================================================
// LINK TERMS
// =============================================================================

/// Source terms of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub address: Option<String>,
    pub dynamic: bool,
    /// Outcomes the receiving end is prepared to apply.
    pub outcomes: Vec<OutcomeKind>,
    pub default_outcome: Option<Outcome>,
}

impl Source {
    /// Source for a consumer on a transacted session.
    ///
    /// Advertises every outcome and defaults unsettled deliveries to
    /// `modified(delivery-failed)` so they are redelivered if the link dies.
    pub fn transactable(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            dynamic: false,
            outcomes: OutcomeKind::ALL.to_vec(),
            default_outcome: Some(Outcome::delivery_failed()),
        }
    }

    /// Source of the sending end of a coordinator link.
    pub fn coordinator_controller() -> Self {
        Self {
            address: None,
            dynamic: false,
            outcomes: OutcomeKind::ALL.to_vec(),
            default_outcome: None,
        }
    }
}

/// Target terms of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// An ordinary node (queue or topic).
    Node { address: String },
    /// The transaction coordinator.
    Coordinator { capabilities: Vec<String> },
}

// =============================================================================
// FRAMES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attach {
    pub handle: LinkHandle,
    pub name: String,
    pub role: Role,
    pub source: Option<Source>,
    pub target: Option<Target>,
}

impl Attach {
    /// Attach of a transaction controller towards the coordinator.
    pub fn coordinator(handle: LinkHandle, name: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            role: Role::Sender,
            source: Some(Source::coordinator_controller()),
            target: Some(Target::Coordinator { capabilities }),
        }
    }

    pub fn sender(handle: LinkHandle, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            role: Role::Sender,
            source: None,
            target: Some(Target::Node {
                address: address.into(),
            }),
        }
    }

    pub fn receiver(handle: LinkHandle, name: impl Into<String>, source: Source) -> Self {
        Self {
            handle,
            name: name.into(),
            role: Role::Receiver,
            source: Some(source),
            target: None,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self.target, Some(Target::Coordinator { .. }))
    }
}

/// Body of a coordinator control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    /// Request a new transaction id. Always empty: global ids are not used.
    Declare,
    Discharge { txn_id: TxnId, fail: bool },
}

/// Payload of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque, already encoded application message.
    Message(Vec<u8>),
    Control(Control),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub handle: LinkHandle,
    pub delivery_id: DeliveryId,
    /// Sender-settled. Orthogonal to the transactional outcome.
    pub settled: bool,
    pub state: Option<DeliveryState>,
    pub payload: Payload,
}

impl Transfer {
    /// Unsettled control transfer on a coordinator link.
    pub fn control(handle: LinkHandle, delivery_id: DeliveryId, control: Control) -> Self {
        Self {
            handle,
            delivery_id,
            settled: false,
            state: None,
            payload: Payload::Control(control),
        }
    }

    pub fn message(handle: LinkHandle, delivery_id: DeliveryId, body: Vec<u8>, settled: bool) -> Self {
        Self {
            handle,
            delivery_id,
            settled,
            state: None,
            payload: Payload::Message(body),
        }
    }

    pub fn control_body(&self) -> Option<&Control> {
        match &self.payload {
            Payload::Control(control) => Some(control),
            Payload::Message(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    /// Role of the endpoint emitting the disposition.
    pub role: Role,
    pub first: DeliveryId,
    pub last: Option<DeliveryId>,
    pub settled: bool,
    pub state: Option<DeliveryState>,
}

impl Disposition {
    /// Whether this disposition covers the given delivery.
    pub fn covers(&self, delivery_id: DeliveryId) -> bool {
        let last = self.last.unwrap_or(self.first);
        self.first <= delivery_id && delivery_id <= last
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub handle: LinkHandle,
    pub delivery_count: u32,
    pub link_credit: u32,
    pub drain: bool,
    pub echo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detach {
    pub handle: LinkHandle,
    pub closed: bool,
    pub error: Option<ErrorCondition>,
}

/// Any frame the transaction layer sends or observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Attach(Attach),
    Transfer(Transfer),
    Disposition(Disposition),
    Flow(Flow),
    Detach(Detach),
}

impl Frame {
    /// Link the frame belongs to. Dispositions are session-level.
    pub fn handle(&self) -> Option<LinkHandle> {
        match self {
            Frame::Attach(attach) => Some(attach.handle),
            Frame::Transfer(transfer) => Some(transfer.handle),
            Frame::Flow(flow) => Some(flow.handle),
            Frame::Detach(detach) => Some(detach.handle),
            Frame::Disposition(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Attach(_) => "attach",
            Frame::Transfer(_) => "transfer",
            Frame::Disposition(_) => "disposition",
            Frame::Flow(_) => "flow",
            Frame::Detach(_) => "detach",
        }
    }
}
