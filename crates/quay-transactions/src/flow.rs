//! # Consumer Flow Controller
//!
//! Owns the consumers of a transacted session: their prefetch buffers and
//! their link credit.
//!
//! Rollback needs a stable set of prefetched deliveries to release, so credit
//! is taken away first:
//!
//! ```text
//! stop_all()           drain every consumer with credit outstanding,
//!                      wait until the credit is used up or zeroed
//! release_unconsumed() settle every buffered delivery as `released`
//! restart_all()        grant `prefetch - buffered` credit again
//! ```
//!
//! Commit never goes through here.

use crate::domain::entities::{ConsumerFlowState, FlowStep, PendingDelivery};
use crate::domain::errors::{TransactionError, TransportError};
use crate::ports::outbound::SessionWire;
use crate::tagger::TransferTagger;
use futures::future::join_all;
use quay_telemetry::metrics::{DELIVERIES_RELEASED, DRAIN_DURATION};
use quay_telemetry::time_histogram;
use shared_bus::{FrameFilter, Subscription, SubscriptionError};
use shared_types::entities::LinkHandle;
use shared_types::frames::{Attach, Detach, Flow, Frame, Payload, Source};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ConsumerLink {
    handle: LinkHandle,
    address: String,
    prefetch: u32,
    /// Credit the remote may still use.
    credit: u32,
    delivery_count: u32,
    buffer: VecDeque<PendingDelivery>,
    state: ConsumerFlowState,
    remote_open: bool,
    inbound: Subscription,
}

impl ConsumerLink {
    fn pump(&mut self) {
        loop {
            match self.inbound.try_recv() {
                Ok(Some(frame)) => self.on_frame(frame),
                Ok(None) => break,
                Err(SubscriptionError::Closed) => {
                    self.remote_open = false;
                    break;
                }
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Transfer(transfer) => {
                let Payload::Message(body) = transfer.payload else {
                    return;
                };
                self.buffer.push_back(PendingDelivery {
                    handle: self.handle,
                    delivery_id: transfer.delivery_id,
                    body,
                });
                self.credit = self.credit.saturating_sub(1);
                self.delivery_count = self.delivery_count.wrapping_add(1);
            }
            Frame::Flow(flow) => {
                self.delivery_count = flow.delivery_count;
                self.credit = flow.link_credit;
            }
            Frame::Detach(detach) => {
                debug!(handle = %self.handle, error = ?detach.error, "Consumer detached by remote");
                self.remote_open = false;
            }
            _ => {}
        }
    }

    fn step(&mut self, step: FlowStep) {
        match self.state.step(step) {
            Some(next) => self.state = next,
            None => debug!(
                handle = %self.handle,
                state = self.state.name(),
                step = ?step,
                "Ignoring flow step"
            ),
        }
    }

    /// No further deliveries can arrive without new credit.
    fn is_exhausted(&self) -> bool {
        self.credit == 0 || !self.remote_open
    }

    async fn await_exhausted(&mut self) {
        while !self.is_exhausted() {
            match self.inbound.recv().await {
                Some(frame) => self.on_frame(frame),
                None => self.remote_open = false,
            }
        }
    }

    async fn next_delivery(&mut self) -> Option<PendingDelivery> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Some(delivery);
            }
            if !self.remote_open {
                return None;
            }
            match self.inbound.recv().await {
                Some(frame) => self.on_frame(frame),
                None => self.remote_open = false,
            }
        }
    }

    fn flow(&self, drain: bool, echo: bool) -> Frame {
        Frame::Flow(Flow {
            handle: self.handle,
            delivery_count: self.delivery_count,
            link_credit: self.credit,
            drain,
            echo,
        })
    }
}

/// Credit and prefetch management for every consumer of one session.
pub struct ConsumerFlowController {
    wire: SessionWire,
    drain_timeout: Duration,
    consumers: BTreeMap<LinkHandle, ConsumerLink>,
}

impl ConsumerFlowController {
    pub fn new(wire: SessionWire, drain_timeout: Duration) -> Self {
        Self {
            wire,
            drain_timeout,
            consumers: BTreeMap::new(),
        }
    }

    /// Attach a consumer on `address` and grant `prefetch` credit.
    pub async fn attach(&mut self, address: &str, prefetch: u32) -> Result<LinkHandle, TransportError> {
        let handle = self.wire.ids.next_handle();
        let inbound = self.wire.inbound.subscribe(FrameFilter::link(handle));
        let name = format!("quay:consumer:{}", Uuid::new_v4());

        self.wire
            .sink
            .send(Frame::Attach(Attach::receiver(
                handle,
                name,
                Source::transactable(address),
            )))
            .await?;

        let link = ConsumerLink {
            handle,
            address: address.to_string(),
            prefetch,
            credit: prefetch,
            delivery_count: 0,
            buffer: VecDeque::new(),
            state: ConsumerFlowState::Idle,
            remote_open: true,
            inbound,
        };
        self.wire.sink.send(link.flow(false, false)).await?;

        info!(handle = %handle, address = %address, prefetch, "Consumer attached");
        self.consumers.insert(handle, link);
        Ok(handle)
    }

    pub fn contains(&self, handle: LinkHandle) -> bool {
        self.consumers.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn state(&self, handle: LinkHandle) -> Option<ConsumerFlowState> {
        self.consumers.get(&handle).map(|link| link.state)
    }

    pub fn credit(&self, handle: LinkHandle) -> Option<u32> {
        self.consumers.get(&handle).map(|link| link.credit)
    }

    /// Deliveries prefetched but not yet consumed.
    pub fn buffered(&mut self, handle: LinkHandle) -> Option<usize> {
        self.consumers.get_mut(&handle).map(|link| {
            link.pump();
            link.buffer.len()
        })
    }

    /// Next prefetched delivery, waiting up to `wait` for one to arrive.
    ///
    /// `None` means nothing arrived in time or the consumer was detached.
    pub async fn receive(
        &mut self,
        handle: LinkHandle,
        wait: Option<Duration>,
    ) -> Result<Option<PendingDelivery>, TransactionError> {
        let link = self
            .consumers
            .get_mut(&handle)
            .ok_or(TransactionError::UnknownLink(handle))?;

        link.pump();
        if let Some(delivery) = link.buffer.pop_front() {
            return Ok(Some(delivery));
        }
        let Some(wait) = wait else {
            return Ok(None);
        };
        Ok(timeout(wait, link.next_delivery()).await.unwrap_or(None))
    }

    /// Put a delivery back at the head of its consumer's buffer.
    ///
    /// Used when a delivery was taken but never reached the application.
    /// Returns `false` if the consumer is gone.
    pub fn requeue(&mut self, delivery: PendingDelivery) -> bool {
        match self.consumers.get_mut(&delivery.handle) {
            Some(link) => {
                link.buffer.push_front(delivery);
                true
            }
            None => false,
        }
    }

    /// Top credit back up so that `credit + buffered == prefetch`.
    pub async fn replenish(&mut self, handle: LinkHandle) -> Result<(), TransactionError> {
        let link = self
            .consumers
            .get_mut(&handle)
            .ok_or(TransactionError::UnknownLink(handle))?;

        if link.state != ConsumerFlowState::Idle || !link.remote_open {
            return Ok(());
        }
        let buffered = u32::try_from(link.buffer.len()).unwrap_or(u32::MAX);
        if link.credit.saturating_add(buffered) >= link.prefetch {
            return Ok(());
        }

        link.credit = link.prefetch - buffered;
        self.wire.sink.send(link.flow(false, false)).await?;
        Ok(())
    }

    /// Stop credit on every consumer and wait until no more deliveries can
    /// arrive.
    ///
    /// Consumers without outstanding credit are stopped immediately. The
    /// rest are drained; a drain that outlives the drain timeout is given up
    /// on and the consumer treated as stopped.
    pub async fn stop_all(&mut self) -> Result<(), TransportError> {
        let _timer = time_histogram!(DRAIN_DURATION);
        let mut draining = 0usize;

        for link in self.consumers.values_mut() {
            link.pump();
            if link.is_exhausted() {
                link.step(FlowStep::Exhausted);
                debug!(handle = %link.handle, "Consumer has no credit outstanding; not draining");
                continue;
            }
            debug!(handle = %link.handle, credit = link.credit, "Draining consumer");
            self.wire.sink.send(link.flow(true, true)).await?;
            link.step(FlowStep::Drain);
            draining += 1;
        }

        if draining > 0 {
            let pending = self
                .consumers
                .values_mut()
                .filter(|link| link.state == ConsumerFlowState::Draining)
                .map(|link| link.await_exhausted());

            if timeout(self.drain_timeout, join_all(pending)).await.is_err() {
                warn!(
                    consumers = draining,
                    timeout = ?self.drain_timeout,
                    "Consumer drain timed out; proceeding with rollback"
                );
            }
        }

        for link in self.consumers.values_mut() {
            if link.state == ConsumerFlowState::Draining {
                link.step(FlowStep::Exhausted);
            }
        }
        Ok(())
    }

    /// Release every prefetched delivery the application has not consumed.
    pub async fn release_unconsumed(&mut self) -> Result<usize, TransportError> {
        let mut released = 0;
        for link in self.consumers.values_mut() {
            link.pump();
            released += release_buffer(&self.wire, link).await?;
        }
        if released > 0 {
            info!(released, "Released unconsumed deliveries");
        }
        Ok(released)
    }

    /// Grant credit again to every stopped consumer.
    ///
    /// Consumers the remote closed in the meantime are dropped.
    pub async fn restart_all(&mut self) -> Result<(), TransportError> {
        self.consumers.retain(|handle, link| {
            if !link.remote_open {
                info!(handle = %handle, address = %link.address, "Dropping consumer closed by remote");
            }
            link.remote_open
        });

        for link in self.consumers.values_mut() {
            if link.state == ConsumerFlowState::Idle {
                continue;
            }
            link.step(FlowStep::Restart);
            let buffered = u32::try_from(link.buffer.len()).unwrap_or(u32::MAX);
            link.credit = link.prefetch.saturating_sub(buffered);
            self.wire.sink.send(link.flow(false, false)).await?;
            link.step(FlowStep::Resumed);
            debug!(handle = %link.handle, credit = link.credit, "Consumer restarted");
        }
        Ok(())
    }

    /// Release the consumer's prefetched deliveries, detach it and forget it.
    pub async fn close(&mut self, handle: LinkHandle) -> Result<usize, TransactionError> {
        let mut link = self
            .consumers
            .remove(&handle)
            .ok_or(TransactionError::UnknownLink(handle))?;

        link.pump();
        let released = release_buffer(&self.wire, &mut link).await?;
        self.wire
            .sink
            .send(Frame::Detach(Detach {
                handle,
                closed: true,
                error: None,
            }))
            .await?;
        info!(handle = %handle, released, "Consumer closed");
        Ok(released)
    }

    /// Detach every consumer, ignoring transport failures.
    pub async fn detach_all(&mut self) {
        for handle in std::mem::take(&mut self.consumers).into_keys() {
            let detach = Frame::Detach(Detach {
                handle,
                closed: true,
                error: None,
            });
            if let Err(e) = self.wire.sink.send(detach).await {
                debug!(handle = %handle, error = %e, "Consumer detach not sent");
            }
        }
    }
}

async fn release_buffer(wire: &SessionWire, link: &mut ConsumerLink) -> Result<usize, TransportError> {
    let mut released = 0;
    // Popped only once the disposition is out, so a failed send keeps it.
    while let Some(delivery_id) = link.buffer.front().map(|delivery| delivery.delivery_id) {
        wire.sink
            .send(Frame::Disposition(TransferTagger::release(delivery_id)))
            .await?;
        link.buffer.pop_front();
        DELIVERIES_RELEASED.inc();
        released += 1;
    }
    Ok(released)
}
