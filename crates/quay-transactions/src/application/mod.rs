//! # Application Module
//!
//! - `TransactionContext`: drives the epoch state machine over the
//!   coordinator link, the tagger and the consumer flow controller.
//! - `TransactedSession`: producer/consumer facade on top of the context.

pub mod service;
pub mod session;

pub use service::TransactionContext;
pub use session::TransactedSession;
