//! Domain invariants for transaction coordination
//!
//! Checked over the sequence of frames a session wrote to the wire.

use crate::tagger::TransferTagger;
use shared_types::entities::TxnId;
use shared_types::frames::{Frame, Payload};
use shared_types::outcomes::{DeliveryState, Outcome};

/// Every enlisted send and acknowledgement references the given epoch.
pub fn invariant_enlisted_in(frames: &[Frame], txn_id: &TxnId) -> bool {
    frames
        .iter()
        .filter_map(TransferTagger::enlisted_in)
        .all(|enlisted| enlisted == txn_id)
}

/// Message transfers are only written while an epoch is open.
pub fn invariant_no_untagged_sends(frames: &[Frame]) -> bool {
    frames.iter().all(|frame| match frame {
        Frame::Transfer(transfer) => match transfer.payload {
            Payload::Message(_) => TransferTagger::enlisted_in(frame).is_some(),
            Payload::Control(_) => true,
        },
        _ => true,
    })
}

/// A commit does not touch consumer credit.
pub fn invariant_commit_leaves_flow_untouched(frames: &[Frame]) -> bool {
    !frames.iter().any(|frame| matches!(frame, Frame::Flow(_)))
}

/// Number of settled `Released` dispositions in `frames`.
pub fn released_count(frames: &[Frame]) -> usize {
    frames
        .iter()
        .filter(|frame| match frame {
            Frame::Disposition(disposition) => {
                disposition.settled
                    && disposition.state == Some(DeliveryState::Outcome(Outcome::Released))
            }
            _ => false,
        })
        .count()
}

/// Rollback releases exactly the deliveries the application did not consume.
pub fn invariant_release_count(frames: &[Frame], delivered: usize, consumed: usize) -> bool {
    consumed <= delivered && released_count(frames) == delivered - consumed
}
