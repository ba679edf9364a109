//! # Coordinator Link
//!
//! The controller end of a link to the broker's transaction coordinator.
//!
//! ```text
//! Attach(target=coordinator) ──►            ◄── Attach
//! Transfer(Declare)          ──►            ◄── Disposition(declared{txn-id})
//! Transfer(Discharge{txn,f}) ──►            ◄── Disposition(accepted | rejected | ...)
//! ```
//!
//! At most one request is outstanding at a time. A link that was closed by
//! the remote, timed out, or abandoned mid-request is never reused; the owner
//! drops it and attaches a new one.

use crate::config::TransactionConfig;
use crate::domain::errors::{CoordinatorError, TransportError};
use crate::ports::outbound::SessionWire;
use quay_telemetry::metrics::{COORDINATOR_ATTACHES, TXN_DECLARED};
use shared_bus::{FrameFilter, Subscription, SubscriptionError};
use shared_types::entities::{DeliveryId, LinkHandle, Role, TxnId};
use shared_types::frames::{Attach, Control, Detach, Frame, Transfer};
use shared_types::outcomes::{DeliveryState, ErrorCondition, Outcome};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Attached,
    Detached(Option<ErrorCondition>),
}

/// An attached coordinator link.
pub struct CoordinatorLink {
    handle: LinkHandle,
    name: String,
    wire: SessionWire,
    inbound: Subscription,
    request_timeout: Duration,
    in_flight: Option<DeliveryId>,
    status: LinkStatus,
}

impl CoordinatorLink {
    /// Attach a new coordinator link and wait for the remote attach.
    pub async fn attach(wire: SessionWire, config: &TransactionConfig) -> Result<Self, CoordinatorError> {
        let handle = wire.ids.next_handle();
        let name = format!("{}:{}", config.coordinator_link_prefix, Uuid::new_v4());
        let request_timeout = config.request_timeout();

        // Subscribe first: the remote attach may arrive before send() returns.
        let inbound = wire
            .inbound
            .subscribe(FrameFilter::link_with_dispositions(handle, Role::Receiver));

        debug!(handle = %handle, name = %name, "Attaching coordinator link");
        wire.sink
            .send(Frame::Attach(Attach::coordinator(
                handle,
                name.clone(),
                config.coordinator_capabilities.clone(),
            )))
            .await?;

        let mut link = Self {
            handle,
            name,
            wire,
            inbound,
            request_timeout,
            in_flight: None,
            status: LinkStatus::Attached,
        };

        match timeout(request_timeout, link.await_remote_attach()).await {
            Ok(Ok(())) => {
                COORDINATOR_ATTACHES.inc();
                info!(handle = %link.handle, name = %link.name, "Coordinator link attached");
                Ok(link)
            }
            Ok(Err(e)) => {
                warn!(handle = %link.handle, error = %e, "Coordinator attach refused");
                link.close().await;
                Err(e)
            }
            Err(_) => {
                warn!(handle = %link.handle, timeout = ?request_timeout, "Coordinator attach timed out");
                link.close().await;
                Err(CoordinatorError::Timeout(request_timeout))
            }
        }
    }

    pub fn handle(&self) -> LinkHandle {
        self.handle
    }

    /// Request a new transaction id.
    pub async fn declare(&mut self) -> Result<TxnId, CoordinatorError> {
        match self.request(Control::Declare).await? {
            Some(DeliveryState::Declared { txn_id }) => {
                TXN_DECLARED.inc();
                info!(txn_id = %txn_id, handle = %self.handle, "Transaction declared");
                Ok(txn_id)
            }
            Some(DeliveryState::Outcome(Outcome::Rejected { error })) => Err(CoordinatorError::Rejected(error)),
            other => Err(CoordinatorError::UnexpectedState(describe(other.as_ref()))),
        }
    }

    /// End `txn_id`, committing when `fail` is false.
    ///
    /// Returns whatever terminal outcome the coordinator chose; interpreting
    /// it is left to the caller.
    pub async fn discharge(&mut self, txn_id: &TxnId, fail: bool) -> Result<Outcome, CoordinatorError> {
        let control = Control::Discharge {
            txn_id: txn_id.clone(),
            fail,
        };
        match self.request(control).await? {
            Some(DeliveryState::Outcome(outcome)) => {
                debug!(txn_id = %txn_id, fail, outcome = %outcome, "Discharge resolved");
                Ok(outcome)
            }
            other => Err(CoordinatorError::UnexpectedState(describe(other.as_ref()))),
        }
    }

    /// Process frames that arrived since the last call and report whether the
    /// link is still attached.
    pub fn poll_remote(&mut self) -> bool {
        loop {
            match self.inbound.try_recv() {
                Ok(Some(Frame::Detach(detach))) => self.on_remote_detach(detach),
                // Late dispositions of abandoned requests.
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(SubscriptionError::Closed) => {
                    self.status = LinkStatus::Detached(None);
                    break;
                }
            }
        }
        self.is_attached()
    }

    pub fn is_attached(&self) -> bool {
        self.status == LinkStatus::Attached
    }

    /// Error the remote gave when it detached the link.
    pub fn remote_error(&self) -> Option<&ErrorCondition> {
        match &self.status {
            LinkStatus::Detached(error) => error.as_ref(),
            LinkStatus::Attached => None,
        }
    }

    /// Whether a request was sent and never resolved.
    pub fn has_request_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Send a closing detach, ignoring failures.
    pub async fn close(mut self) {
        let detach = Frame::Detach(Detach {
            handle: self.handle,
            closed: true,
            error: None,
        });
        if let Err(e) = self.wire.sink.send(detach).await {
            debug!(handle = %self.handle, error = %e, "Coordinator detach not sent");
        }
        self.status = LinkStatus::Detached(None);
    }

    async fn request(&mut self, control: Control) -> Result<Option<DeliveryState>, CoordinatorError> {
        if let Some(delivery_id) = self.in_flight {
            return Err(CoordinatorError::RequestInFlight(delivery_id));
        }
        if !self.poll_remote() {
            return Err(CoordinatorError::LinkClosed(self.remote_error().cloned()));
        }

        let delivery_id = self.wire.ids.next_delivery_id();
        let kind = match &control {
            Control::Declare => "declare",
            Control::Discharge { .. } => "discharge",
        };
        debug!(handle = %self.handle, delivery_id = %delivery_id, request = kind, "Sending coordinator request");

        self.in_flight = Some(delivery_id);
        self.wire
            .sink
            .send(Frame::Transfer(Transfer::control(self.handle, delivery_id, control)))
            .await?;

        match timeout(self.request_timeout, self.await_disposition(delivery_id)).await {
            Ok(Ok(state)) => {
                self.in_flight = None;
                Ok(state)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    handle = %self.handle,
                    delivery_id = %delivery_id,
                    request = kind,
                    timeout = ?self.request_timeout,
                    "Coordinator request timed out"
                );
                Err(CoordinatorError::Timeout(self.request_timeout))
            }
        }
    }

    async fn await_remote_attach(&mut self) -> Result<(), CoordinatorError> {
        loop {
            match self.inbound.recv().await {
                Some(Frame::Attach(_)) => return Ok(()),
                Some(Frame::Detach(detach)) => {
                    self.on_remote_detach(detach);
                    return Err(CoordinatorError::LinkClosed(self.remote_error().cloned()));
                }
                Some(_) => continue,
                None => return Err(TransportError::ConnectionClosed.into()),
            }
        }
    }

    async fn await_disposition(&mut self, delivery_id: DeliveryId) -> Result<Option<DeliveryState>, CoordinatorError> {
        loop {
            match self.inbound.recv().await {
                Some(Frame::Disposition(disposition)) if disposition.covers(delivery_id) => {
                    return Ok(disposition.state);
                }
                Some(Frame::Detach(detach)) => {
                    self.on_remote_detach(detach);
                    return Err(CoordinatorError::LinkClosed(self.remote_error().cloned()));
                }
                Some(_) => continue,
                None => {
                    self.status = LinkStatus::Detached(None);
                    return Err(TransportError::ConnectionClosed.into());
                }
            }
        }
    }

    fn on_remote_detach(&mut self, detach: Detach) {
        warn!(
            handle = %self.handle,
            closed = detach.closed,
            error = ?detach.error,
            "Coordinator link detached by remote"
        );
        self.status = LinkStatus::Detached(detach.error);
    }
}

fn describe(state: Option<&DeliveryState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "no delivery state".to_string(),
    }
}
