//! Consumer-side entities
//!
//! ## Clusters
//!
//! - **Deliveries**: `PendingDelivery`
//! - **Flow**: `ConsumerFlowState`, `FlowStep`

use shared_types::entities::{DeliveryId, LinkHandle};

// =============================================================================
// DELIVERIES
// =============================================================================

/// A delivery sitting in a consumer's prefetch buffer.
///
/// Unsettled until the application consumes it (transactional accept) or a
/// rollback or consumer close releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub handle: LinkHandle,
    pub delivery_id: DeliveryId,
    pub body: Vec<u8>,
}

// =============================================================================
// FLOW
// =============================================================================

/// Per-consumer credit state around a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerFlowState {
    /// Credit flowing normally.
    #[default]
    Idle,
    /// Drain requested, waiting for the remote to use up or zero the credit.
    Draining,
    /// No credit outstanding; the buffered set is final.
    Stopped,
    /// Restart flow being issued.
    Restarting,
}

/// Inputs to [`ConsumerFlowState::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// A drain flow was sent.
    Drain,
    /// Outstanding credit reached zero, or the remote detached.
    Exhausted,
    Restart,
    /// Restart flow sent.
    Resumed,
}

impl ConsumerFlowState {
    /// Next state, or `None` if the step does not apply.
    pub fn step(self, step: FlowStep) -> Option<Self> {
        use ConsumerFlowState::*;

        match (self, step) {
            (Idle, FlowStep::Drain) => Some(Draining),
            (Idle | Draining, FlowStep::Exhausted) => Some(Stopped),
            (Draining | Stopped, FlowStep::Restart) => Some(Restarting),
            (Restarting, FlowStep::Resumed) => Some(Idle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConsumerFlowState::Idle => "IDLE",
            ConsumerFlowState::Draining => "DRAINING",
            ConsumerFlowState::Stopped => "STOPPED",
            ConsumerFlowState::Restarting => "RESTARTING",
        }
    }
}
