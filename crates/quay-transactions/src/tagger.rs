//! # Transfer Tagger
//!
//! Stamps and reads `TransactionalState` on message transfers and consumer
//! dispositions.
//!
//! - Producer transfers propose `outcome: None`; the coordinator decides.
//!   Sender settlement is left exactly as the caller set it.
//! - Consumed deliveries are acknowledged immediately with a settled
//!   disposition carrying `outcome: Accepted`. The acknowledgement only takes
//!   effect when the epoch commits.

use shared_types::entities::{DeliveryId, Role, TxnId};
use shared_types::frames::{Disposition, Frame, Transfer};
use shared_types::outcomes::{DeliveryState, Outcome, TransactionalState};

/// Stateless tagging of enlisted work.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferTagger;

impl TransferTagger {
    /// Enlist a producer transfer in `txn_id`.
    pub fn tag_send(txn_id: &TxnId, mut transfer: Transfer) -> Transfer {
        transfer.state = Some(DeliveryState::Transactional(TransactionalState {
            txn_id: txn_id.clone(),
            outcome: None,
        }));
        transfer
    }

    /// Settled transactional acceptance of a consumed delivery.
    pub fn acknowledgement(txn_id: &TxnId, delivery_id: DeliveryId) -> Disposition {
        Disposition {
            role: Role::Receiver,
            first: delivery_id,
            last: None,
            settled: true,
            state: Some(DeliveryState::Transactional(TransactionalState {
                txn_id: txn_id.clone(),
                outcome: Some(Outcome::Accepted),
            })),
        }
    }

    /// Settled release of a delivery that was never consumed.
    ///
    /// Not transactional: the delivery was not part of any epoch.
    pub fn release(delivery_id: DeliveryId) -> Disposition {
        Disposition {
            role: Role::Receiver,
            first: delivery_id,
            last: None,
            settled: true,
            state: Some(DeliveryState::Outcome(Outcome::Released)),
        }
    }

    /// Transactional state carried by an outbound frame, if any.
    pub fn transactional_state(frame: &Frame) -> Option<&TransactionalState> {
        let state = match frame {
            Frame::Transfer(transfer) => transfer.state.as_ref(),
            Frame::Disposition(disposition) => disposition.state.as_ref(),
            _ => None,
        };
        match state {
            Some(DeliveryState::Transactional(state)) => Some(state),
            _ => None,
        }
    }

    /// Transaction an outbound frame was enlisted in.
    pub fn enlisted_in(frame: &Frame) -> Option<&TxnId> {
        Self::transactional_state(frame).map(|state| &state.txn_id)
    }
}
