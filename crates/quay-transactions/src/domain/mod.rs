//! Domain module for transaction coordination
//!
//! Contains the transaction state machine, consumer-side entities, value
//! objects, errors, and invariants.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod state;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use state::*;
pub use value_objects::*;
