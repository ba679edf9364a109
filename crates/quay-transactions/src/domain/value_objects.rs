//! Value objects for transaction coordination

use shared_types::entities::{DeliveryId, LinkHandle};
use std::sync::atomic::{AtomicU32, Ordering};

/// Session-scoped identifier allocation.
///
/// Shared by the session and every link it owns so that handles and outgoing
/// delivery ids never collide.
#[derive(Debug, Default)]
pub struct SessionIds {
    next_handle: AtomicU32,
    next_delivery_id: AtomicU32,
}

impl SessionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_handle(&self) -> LinkHandle {
        LinkHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Next outgoing delivery id. Wraps at `u32::MAX` like the wire field.
    pub fn next_delivery_id(&self) -> DeliveryId {
        DeliveryId(self.next_delivery_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result of enlisting a send or acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnlistOutcome {
    /// Written to the wire under the current transaction.
    Sent,
    /// The epoch is dead; nothing was written. Surfaces at the next commit.
    Dropped,
}
