//! # Shared Bus - Inbound Frame Routing
//!
//! Frames arriving from the peer are published once on the bus and fanned out
//! to every link endpoint whose filter matches.
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐  subscribe(filter)  ┌─────────────┐
//! │  Connection  │ ─────────────► │  Frame Bus   │ ──────────────────► │ Coordinator │
//! │    reader    │                │   (routed)   │ ──────────────────► │ Consumer h2 │
//! └──────────────┘                └──────────────┘                     └─────────────┘
//! ```
//!
//! ## Ordering
//!
//! A subscription only sees frames published after it was created. Endpoints
//! subscribe before sending the frame whose reply they wait for.
//!
//! ## Delivery
//!
//! Every subscription has its own unbounded queue. Frames are never dropped
//! for a live subscription, however long it goes unpolled.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod filter;
pub mod publisher;
pub mod subscriber;

pub use filter::FrameFilter;
pub use publisher::{FramePublisher, InMemoryFrameBus};
pub use subscriber::{FrameSubscriber, Subscription, SubscriptionError};
