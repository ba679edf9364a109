//! # Frame Publisher
//!
//! Defines the publishing side of the frame bus.

use crate::filter::FrameFilter;
use crate::subscriber::{FrameSubscriber, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::frames::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Trait for publishing inbound frames to the bus.
#[async_trait]
pub trait FramePublisher: Send + Sync {
    /// Publish a frame received from the peer.
    ///
    /// Returns the number of active subscriptions that received it.
    async fn publish(&self, frame: Frame) -> usize;

    /// Total number of frames published.
    fn frames_published(&self) -> u64;
}

/// One subscription as seen from the publishing side.
struct Route {
    filter: FrameFilter,
    sender: mpsc::UnboundedSender<Frame>,
}

/// In-memory frame bus.
///
/// Each subscription gets its own unbounded queue and only the frames its
/// filter accepts, so a link that is not being polled cannot push another
/// link's frames out.
pub struct InMemoryFrameBus {
    routes: Mutex<Vec<Route>>,
    frames_published: AtomicU64,
}

impl InMemoryFrameBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            frames_published: AtomicU64::new(0),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut routes = self.routes.lock();
        routes.retain(|route| !route.sender.is_closed());
        routes.len()
    }
}

impl Default for InMemoryFrameBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSubscriber for InMemoryFrameBus {
    fn subscribe(&self, filter: FrameFilter) -> Subscription {
        debug!(handles = ?filter.handles, dispositions = ?filter.dispositions, "New subscription created");
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes.lock().push(Route {
            filter: filter.clone(),
            sender,
        });
        Subscription::new(receiver, filter)
    }
}

#[async_trait]
impl FramePublisher for InMemoryFrameBus {
    async fn publish(&self, frame: Frame) -> usize {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        let kind = frame.name();
        let handle = frame.handle();

        let mut receivers = 0;
        // A failed send means the subscription was dropped.
        self.routes.lock().retain(|route| {
            if !route.filter.matches(&frame) {
                return !route.sender.is_closed();
            }
            match route.sender.send(frame.clone()) {
                Ok(()) => {
                    receivers += 1;
                    true
                }
                Err(_) => false,
            }
        });

        if receivers == 0 {
            debug!(frame = kind, handle = ?handle, "Frame dropped (no subscribers)");
        } else {
            trace!(frame = kind, handle = ?handle, receivers, "Frame published");
        }
        receivers
    }

    fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }
}
