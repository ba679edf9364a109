//! # Error Types
//!
//! Errors raised while building wire values.

use thiserror::Error;

/// Errors that can occur when constructing wire-model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// A transaction id must carry at least one octet.
    #[error("Transaction id is empty")]
    EmptyTxnId,

    /// Transaction ids are restricted to 32 octets.
    #[error("Transaction id too long: {len} > {max} octets")]
    TxnIdTooLong { len: usize, max: usize },
}
