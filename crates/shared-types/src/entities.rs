//! # Core Identifiers
//!
//! Session-scoped identifiers and the opaque transaction id.
//!
//! ## Clusters
//!
//! - **Links**: `LinkHandle`, `Role`
//! - **Deliveries**: `DeliveryId`
//! - **Transactions**: `TxnId`

use crate::errors::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a transaction id in octets (AMQP 1.0 section 4.5.4).
pub const MAX_TXN_ID_LEN: usize = 32;

// =============================================================================
// LINKS
// =============================================================================

/// Session-local handle of an attached link.
///
/// The connection layer maps remote handles onto the local ones before a
/// frame is published, so every frame seen by the transaction layer speaks
/// in local handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkHandle(pub u32);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Role of the endpoint that emitted a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Receiver,
}

// =============================================================================
// DELIVERIES
// =============================================================================

/// Session-scoped delivery id.
///
/// Outgoing and incoming deliveries are numbered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub u32);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Opaque transaction identifier allocated by the coordinator.
///
/// Only valid for one epoch. Equality is byte equality; the client never
/// interprets the contents.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Vec<u8>);

impl TxnId {
    /// Build a transaction id, enforcing the 1..=32 octet restriction.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TypeError::EmptyTxnId);
        }
        if bytes.len() > MAX_TXN_ID_LEN {
            return Err(TypeError::TxnIdTooLong {
                len: bytes.len(),
                max: MAX_TXN_ID_LEN,
            });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({})", hex::encode(&self.0))
    }
}

impl TryFrom<&[u8]> for TxnId {
    type Error = TypeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::new(value.to_vec())
    }
}
