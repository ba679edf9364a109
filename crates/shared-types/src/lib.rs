//! # Shared Types Crate
//!
//! This crate contains the AMQP 1.0 wire model used by every other crate in
//! the workspace: link and delivery identifiers, transaction ids, the closed
//! outcome and delivery-state unions, link terms and the five performatives
//! the transaction layer exchanges.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All frame shapes are defined here.
//! - **Closed unions**: Outcomes and delivery states are enums resolved by
//!   pattern match. There is no open hierarchy to extend.
//! - **No byte layout**: Frame marshalling belongs to the connection layer;
//!   these types only carry the fields the transaction layer observes.

pub mod entities;
pub mod errors;
pub mod frames;
pub mod outcomes;

pub use entities::*;
pub use errors::*;
pub use frames::*;
pub use outcomes::*;
