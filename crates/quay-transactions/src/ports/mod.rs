//! Ports for transaction coordination
//!
//! - **Inbound**: `TransactionApi` (driven by the session)
//! - **Outbound**: `FrameSink` (writes to the connection)

pub mod inbound;
pub mod outbound;

pub use inbound::TransactionApi;
pub use outbound::{FrameSink, SessionWire};
