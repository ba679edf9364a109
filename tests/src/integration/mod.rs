//! # Integration Tests
//!
//! A `TransactedSession` driven against a [`TestPeer`](crate::peer::TestPeer)
//! over the in-memory frame bus.
//!
//! - `transactions`: commit, rollback and coordinator failure scenarios
//! - `consumers`: prefetch, drain and release behaviour around rollback

pub mod consumers;
