//! # Transacted Session
//!
//! Producer and consumer operations of a transacted session, routed through
//! the [`TransactionContext`].

use crate::application::service::TransactionContext;
use crate::config::TransactionConfig;
use crate::domain::entities::PendingDelivery;
use crate::domain::errors::TransactionError;
use crate::domain::state::TxnState;
use crate::domain::value_objects::EnlistOutcome;
use crate::ports::inbound::TransactionApi;
use crate::ports::outbound::SessionWire;
use shared_types::entities::{LinkHandle, TxnId};
use shared_types::frames::{Attach, Detach, Frame, Transfer};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A session whose sends and acknowledgements all belong to transactions.
pub struct TransactedSession {
    context: TransactionContext,
    wire: SessionWire,
    /// Producer handle to target address.
    producers: BTreeMap<LinkHandle, String>,
    default_prefetch: u32,
}

impl TransactedSession {
    /// Open the session. With `eager_declare` the first transaction is
    /// declared before this returns.
    pub async fn open(config: TransactionConfig, wire: SessionWire) -> Result<Self, TransactionError> {
        let eager = config.eager_declare;
        let default_prefetch = config.default_prefetch;
        let mut context = TransactionContext::new(config, wire.clone());

        if eager {
            context.begin().await?;
        }
        info!(eager, txn_id = ?context.current_txn_id(), "Transacted session opened");

        Ok(Self {
            context,
            wire,
            producers: BTreeMap::new(),
            default_prefetch,
        })
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut TransactionContext {
        &mut self.context
    }

    pub fn current_txn_id(&self) -> Option<TxnId> {
        self.context.current_txn_id()
    }

    pub async fn create_producer(&mut self, address: &str) -> Result<LinkHandle, TransactionError> {
        self.ensure_open()?;
        let handle = self.wire.ids.next_handle();
        let name = format!("quay:producer:{}", Uuid::new_v4());
        self.wire
            .sink
            .send(Frame::Attach(Attach::sender(handle, name, address)))
            .await?;
        self.producers.insert(handle, address.to_string());
        info!(handle = %handle, address = %address, "Producer attached");
        Ok(handle)
    }

    /// Send `body` under the current transaction.
    ///
    /// `Dropped` means the epoch was already lost; the next commit reports it.
    pub async fn send(&mut self, producer: LinkHandle, body: Vec<u8>) -> Result<EnlistOutcome, TransactionError> {
        self.ensure_open()?;
        if !self.producers.contains_key(&producer) {
            return Err(TransactionError::UnknownLink(producer));
        }
        let delivery_id = self.wire.ids.next_delivery_id();
        self.context
            .enlist_send(Transfer::message(producer, delivery_id, body, false))
            .await
    }

    pub async fn close_producer(&mut self, producer: LinkHandle) -> Result<(), TransactionError> {
        self.producers
            .remove(&producer)
            .ok_or(TransactionError::UnknownLink(producer))?;
        self.wire
            .sink
            .send(Frame::Detach(Detach {
                handle: producer,
                closed: true,
                error: None,
            }))
            .await?;
        Ok(())
    }

    /// Attach a consumer. `None` uses the configured default prefetch.
    pub async fn create_consumer(&mut self, address: &str, prefetch: Option<u32>) -> Result<LinkHandle, TransactionError> {
        self.ensure_open()?;
        let prefetch = prefetch.unwrap_or(self.default_prefetch);
        Ok(self.context.consumers_mut().attach(address, prefetch).await?)
    }

    /// Next delivery for `consumer`, acknowledged under the current
    /// transaction.
    ///
    /// The acknowledgement is skipped while the epoch is dead, so the
    /// delivery comes back after the failed commit. If the acknowledgement
    /// fails the delivery stays buffered and the error is returned.
    pub async fn receive(
        &mut self,
        consumer: LinkHandle,
        wait: Option<Duration>,
    ) -> Result<Option<PendingDelivery>, TransactionError> {
        self.ensure_open()?;
        let Some(delivery) = self.context.consumers_mut().receive(consumer, wait).await? else {
            return Ok(None);
        };
        if let Err(e) = self.context.enlist_ack(&delivery).await {
            let delivery_id = delivery.delivery_id;
            if !self.context.consumers_mut().requeue(delivery) {
                warn!(handle = %consumer, delivery_id = %delivery_id, "Consumer gone; unacknowledged delivery not requeued");
            }
            return Err(e);
        }
        self.context.consumers_mut().replenish(consumer).await?;
        Ok(Some(delivery))
    }

    /// Release the consumer's unconsumed deliveries and detach it.
    pub async fn close_consumer(&mut self, consumer: LinkHandle) -> Result<usize, TransactionError> {
        self.context.consumers_mut().close(consumer).await
    }

    pub async fn commit(&mut self) -> Result<(), TransactionError> {
        self.context.commit().await
    }

    pub async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.context.rollback().await
    }

    /// Roll back any open work and detach every link.
    pub async fn close(&mut self) -> Result<(), TransactionError> {
        for handle in std::mem::take(&mut self.producers).into_keys() {
            let detach = Frame::Detach(Detach {
                handle,
                closed: true,
                error: None,
            });
            if let Err(e) = self.wire.sink.send(detach).await {
                debug!(handle = %handle, error = %e, "Producer detach not sent");
            }
        }
        self.context.close().await
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        match self.context.state() {
            TxnState::Closed => Err(TransactionError::SessionClosed),
            _ => Ok(()),
        }
    }
}
