//! Outbound Ports (Driven Ports / SPI)

use crate::domain::errors::TransportError;
use crate::domain::value_objects::SessionIds;
use async_trait::async_trait;
use shared_bus::FrameSubscriber;
use shared_types::frames::Frame;
use std::sync::Arc;

/// Writes frames to the connection.
///
/// The only path by which the transaction layer reaches the wire.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;
}

/// The session's connection to the wire: outbound sink, inbound frame bus,
/// and shared identifier allocation.
#[derive(Clone)]
pub struct SessionWire {
    pub sink: Arc<dyn FrameSink>,
    pub inbound: Arc<dyn FrameSubscriber>,
    pub ids: Arc<SessionIds>,
}

impl SessionWire {
    pub fn new(sink: Arc<dyn FrameSink>, inbound: Arc<dyn FrameSubscriber>) -> Self {
        Self {
            sink,
            inbound,
            ids: Arc::new(SessionIds::new()),
        }
    }
}
