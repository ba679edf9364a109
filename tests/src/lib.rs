//! # Quay Test Suite
//!
//! Unified test crate for the transaction layer.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── peer.rs           # Scripted broker peer (TestPeer)
//! └── integration/      # End-to-end transacted session scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p quay-tests
//!
//! # Benchmarks
//! cargo bench -p quay-tests
//! ```

pub mod integration;
pub mod peer;

pub use peer::{DischargeReply, DrainReply, TestPeer};
