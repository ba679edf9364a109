//! # Test Peer
//!
//! A scripted broker standing on the far side of a session.
//!
//! It records every frame the session writes and answers the way a broker
//! with a transaction coordinator would:
//!
//! - Attach: echoed with the opposite role.
//! - Declare: `declared` with the next txn-id, or `rejected` while refusals
//!   are scripted.
//! - Discharge: the next scripted [`DischargeReply`], `accepted` by default.
//! - Flow on a consumer: queued messages delivered up to the credit; a drain
//!   is answered according to [`DrainReply`].
//! - Dispositions: `released` puts the message back on its queue.

use parking_lot::Mutex;
use quay_transactions::{FrameSink, SessionWire, TransportError};
use shared_bus::{FramePublisher, InMemoryFrameBus};
use shared_types::entities::{DeliveryId, LinkHandle, Role, TxnId};
use shared_types::frames::{Attach, Control, Detach, Disposition, Flow, Frame, Payload, Transfer};
use shared_types::outcomes::{DeliveryState, ErrorCondition, Outcome};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Reply to the next Discharge.
#[derive(Debug, Clone)]
pub enum DischargeReply {
    Accept,
    Reject(Option<ErrorCondition>),
    /// Detach the coordinator link instead of answering.
    CloseLink(Option<ErrorCondition>),
}

/// How a drain flow is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReply {
    /// Flow with the remaining credit consumed (link-credit 0).
    ZeroCredit,
    /// Filler transfers until the credit is used up, no flow.
    Transfers,
    /// No answer at all.
    Silent,
}

struct Consumer {
    address: String,
    credit: u32,
    delivery_count: u32,
}

struct PeerState {
    frames: Vec<Frame>,
    next_txn: u8,
    declare_refusals: usize,
    discharges: VecDeque<DischargeReply>,
    drain_reply: DrainReply,
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    consumers: HashMap<LinkHandle, Consumer>,
    coordinators: Vec<LinkHandle>,
    /// Unsettled deliveries to the session, by delivery id.
    outstanding: HashMap<DeliveryId, (String, Vec<u8>)>,
    next_delivery_id: u32,
}

/// Scripted broker peer.
pub struct TestPeer {
    bus: Arc<InMemoryFrameBus>,
    state: Mutex<PeerState>,
}

impl TestPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bus: Arc::new(InMemoryFrameBus::new()),
            state: Mutex::new(PeerState {
                frames: Vec::new(),
                next_txn: 1,
                declare_refusals: 0,
                discharges: VecDeque::new(),
                drain_reply: DrainReply::ZeroCredit,
                queues: HashMap::new(),
                consumers: HashMap::new(),
                coordinators: Vec::new(),
                outstanding: HashMap::new(),
                next_delivery_id: 0,
            }),
        })
    }

    /// Wire for a session talking to this peer.
    pub fn wire(self: &Arc<Self>) -> SessionWire {
        SessionWire::new(self.clone(), self.bus.clone())
    }

    /// The txn-id handed out by the `n`th declare (1-based).
    pub fn txn_id(n: u8) -> TxnId {
        TxnId::new(vec![0xCA, 0xFE, 0x00, n]).expect("non-empty txn id")
    }

    // =========================================================================
    // SCRIPTING
    // =========================================================================

    pub fn refuse_declares(&self, count: usize) {
        self.state.lock().declare_refusals = count;
    }

    pub fn script_discharge(&self, reply: DischargeReply) {
        self.state.lock().discharges.push_back(reply);
    }

    pub fn set_drain_reply(&self, reply: DrainReply) {
        self.state.lock().drain_reply = reply;
    }

    pub fn enqueue(&self, address: &str, bodies: impl IntoIterator<Item = Vec<u8>>) {
        self.state
            .lock()
            .queues
            .entry(address.to_string())
            .or_default()
            .extend(bodies);
    }

    /// Push queued messages to consumers that have credit.
    pub async fn pump(&self) {
        let replies = {
            let mut state = self.state.lock();
            let handles: Vec<_> = state.consumers.keys().copied().collect();
            handles
                .into_iter()
                .flat_map(|handle| state.deliver(handle))
                .collect::<Vec<_>>()
        };
        self.publish(replies).await;
    }

    /// Detach the current coordinator link from the broker side.
    pub async fn close_coordinator(&self, error: Option<ErrorCondition>) {
        let handle = self.state.lock().coordinators.last().copied();
        if let Some(handle) = handle {
            self.publish(vec![Frame::Detach(Detach {
                handle,
                closed: true,
                error,
            })])
            .await;
        }
    }

    /// Detach a consumer from the broker side.
    pub async fn close_consumer(&self, handle: LinkHandle) {
        self.state.lock().consumers.remove(&handle);
        self.publish(vec![Frame::Detach(Detach {
            handle,
            closed: true,
            error: None,
        })])
        .await;
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Every frame the session wrote, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().frames.clone()
    }

    pub fn clear(&self) {
        self.state.lock().frames.clear();
    }

    pub fn coordinator_attaches(&self) -> usize {
        self.state.lock().coordinators.len()
    }

    pub fn current_coordinator(&self) -> Option<LinkHandle> {
        self.state.lock().coordinators.last().copied()
    }

    pub fn queue_depth(&self, address: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(address)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    async fn publish(&self, frames: Vec<Frame>) {
        for frame in frames {
            self.bus.publish(frame).await;
        }
    }
}

#[async_trait::async_trait]
impl FrameSink for TestPeer {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let replies = {
            let mut state = self.state.lock();
            state.frames.push(frame.clone());
            state.answer(frame)
        };
        self.publish(replies).await;
        Ok(())
    }
}

impl PeerState {
    fn answer(&mut self, frame: Frame) -> Vec<Frame> {
        match frame {
            Frame::Attach(attach) => self.on_attach(attach),
            Frame::Transfer(transfer) => match transfer.payload {
                Payload::Control(Control::Declare) => vec![self.on_declare(transfer.delivery_id)],
                Payload::Control(Control::Discharge { .. }) => {
                    self.on_discharge(transfer.handle, transfer.delivery_id)
                }
                Payload::Message(_) => Vec::new(),
            },
            Frame::Flow(flow) => self.on_flow(flow),
            Frame::Disposition(disposition) => {
                self.on_disposition(disposition);
                Vec::new()
            }
            Frame::Detach(detach) => {
                self.consumers.remove(&detach.handle);
                Vec::new()
            }
        }
    }

    fn on_attach(&mut self, attach: Attach) -> Vec<Frame> {
        if attach.is_coordinator() {
            self.coordinators.push(attach.handle);
        } else if attach.role == Role::Receiver {
            let address = attach
                .source
                .as_ref()
                .and_then(|source| source.address.clone())
                .unwrap_or_default();
            self.consumers.insert(
                attach.handle,
                Consumer {
                    address,
                    credit: 0,
                    delivery_count: 0,
                },
            );
        }

        let role = match attach.role {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        };
        vec![Frame::Attach(Attach { role, ..attach })]
    }

    fn on_declare(&mut self, delivery_id: DeliveryId) -> Frame {
        let state = if self.declare_refusals > 0 {
            self.declare_refusals -= 1;
            DeliveryState::Outcome(Outcome::Rejected {
                error: Some(ErrorCondition::new("amqp:resource-limit-exceeded")),
            })
        } else {
            let txn_id = TestPeer::txn_id(self.next_txn);
            self.next_txn = self.next_txn.wrapping_add(1);
            DeliveryState::Declared { txn_id }
        };
        coordinator_disposition(delivery_id, state)
    }

    fn on_discharge(&mut self, handle: LinkHandle, delivery_id: DeliveryId) -> Vec<Frame> {
        match self.discharges.pop_front().unwrap_or(DischargeReply::Accept) {
            DischargeReply::Accept => vec![coordinator_disposition(
                delivery_id,
                DeliveryState::Outcome(Outcome::Accepted),
            )],
            DischargeReply::Reject(error) => vec![coordinator_disposition(
                delivery_id,
                DeliveryState::Outcome(Outcome::Rejected { error }),
            )],
            DischargeReply::CloseLink(error) => vec![Frame::Detach(Detach {
                handle,
                closed: true,
                error,
            })],
        }
    }

    fn on_flow(&mut self, flow: Flow) -> Vec<Frame> {
        let drain_reply = self.drain_reply;
        let Some(consumer) = self.consumers.get_mut(&flow.handle) else {
            return Vec::new();
        };
        consumer.credit = flow.link_credit;
        consumer.delivery_count = flow.delivery_count;

        let mut replies = self.deliver(flow.handle);
        if !flow.drain {
            return replies;
        }
        let Some(consumer) = self.consumers.get_mut(&flow.handle) else {
            return replies;
        };
        if consumer.credit == 0 {
            return replies;
        }

        match drain_reply {
            DrainReply::ZeroCredit => {
                consumer.delivery_count = consumer.delivery_count.wrapping_add(consumer.credit);
                consumer.credit = 0;
                replies.push(Frame::Flow(Flow {
                    handle: flow.handle,
                    delivery_count: consumer.delivery_count,
                    link_credit: 0,
                    drain: true,
                    echo: false,
                }));
            }
            DrainReply::Transfers => {
                let address = consumer.address.clone();
                let filler = consumer.credit;
                self.queues
                    .entry(address)
                    .or_default()
                    .extend((0..filler).map(|i| format!("filler-{}", i).into_bytes()));
                replies.extend(self.deliver(flow.handle));
            }
            DrainReply::Silent => {}
        }
        replies
    }

    fn on_disposition(&mut self, disposition: Disposition) {
        let last = disposition.last.unwrap_or(disposition.first);
        for id in disposition.first.0..=last.0 {
            let Some((address, body)) = self.outstanding.remove(&DeliveryId(id)) else {
                continue;
            };
            if disposition.state == Some(DeliveryState::Outcome(Outcome::Released)) {
                self.queues.entry(address).or_default().push_front(body);
            }
        }
    }

    /// Deliver queued messages to `handle` while it has credit.
    fn deliver(&mut self, handle: LinkHandle) -> Vec<Frame> {
        let mut frames = Vec::new();
        let Some(consumer) = self.consumers.get_mut(&handle) else {
            return frames;
        };
        let Some(queue) = self.queues.get_mut(&consumer.address) else {
            return frames;
        };

        while consumer.credit > 0 {
            let Some(body) = queue.pop_front() else {
                break;
            };
            let delivery_id = DeliveryId(self.next_delivery_id);
            self.next_delivery_id = self.next_delivery_id.wrapping_add(1);
            consumer.credit -= 1;
            consumer.delivery_count = consumer.delivery_count.wrapping_add(1);
            self.outstanding
                .insert(delivery_id, (consumer.address.clone(), body.clone()));
            frames.push(Frame::Transfer(Transfer::message(handle, delivery_id, body, false)));
        }
        frames
    }
}

fn coordinator_disposition(delivery_id: DeliveryId, state: DeliveryState) -> Frame {
    Frame::Disposition(Disposition {
        role: Role::Receiver,
        first: delivery_id,
        last: None,
        settled: true,
        state: Some(state),
    })
}
