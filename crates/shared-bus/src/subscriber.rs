//! # Frame Subscriber
//!
//! Defines the subscription side of the frame bus.

use crate::filter::FrameFilter;
use shared_types::frames::Frame;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Frame bus closed")]
    Closed,
}

/// Trait for subscribing to inbound frames.
pub trait FrameSubscriber: Send + Sync {
    /// Subscribe to frames matching a filter.
    fn subscribe(&self, filter: FrameFilter) -> Subscription;
}

/// A subscription handle for receiving frames.
///
/// Frames are filtered by the bus before they are queued, and the queue is
/// unbounded: a subscription that is not polled never loses frames, it only
/// holds them. Dropping it unsubscribes.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Frame>,
    filter: FrameFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Frame>, filter: FrameFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next frame that matches the filter.
    ///
    /// Returns `None` once the bus is dropped and every queued frame has been
    /// taken.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Receive a matching frame without waiting.
    ///
    /// - `Ok(Some(frame))` - a matching frame was queued
    /// - `Ok(None)` - nothing queued
    /// - `Err(SubscriptionError::Closed)` - the bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<Frame>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &FrameFilter {
        &self.filter
    }
}
