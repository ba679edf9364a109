//! Inbound Ports (Driving Ports / API)

use crate::domain::entities::PendingDelivery;
use crate::domain::errors::TransactionError;
use crate::domain::value_objects::EnlistOutcome;
use async_trait::async_trait;
use shared_types::entities::TxnId;
use shared_types::frames::Transfer;

/// Transaction operations a session drives.
///
/// One caller at a time; the methods take `&mut self`.
#[async_trait]
pub trait TransactionApi: Send {
    /// Declare a transaction unless one is already active.
    async fn begin(&mut self) -> Result<TxnId, TransactionError>;

    /// Id of the active transaction, if any.
    fn current_txn_id(&self) -> Option<TxnId>;

    /// Send a producer transfer under the active transaction.
    async fn enlist_send(&mut self, transfer: Transfer) -> Result<EnlistOutcome, TransactionError>;

    /// Acknowledge a consumed delivery under the active transaction.
    async fn enlist_ack(&mut self, delivery: &PendingDelivery) -> Result<EnlistOutcome, TransactionError>;

    /// Discharge with `fail = false`, then declare the next epoch.
    ///
    /// Any failure to discharge is reported as `TransactionError::RolledBack`
    /// or `DischargeTimeout`.
    async fn commit(&mut self) -> Result<(), TransactionError>;

    /// Stop consumers, discharge with `fail = true`, release unconsumed
    /// deliveries, declare the next epoch and restart consumers.
    async fn rollback(&mut self) -> Result<(), TransactionError>;
}
