//! # Transaction Context
//!
//! Owns the session's transaction: the current epoch, the coordinator link it
//! was declared on, and the session's consumers.
//!
//! Every public operation first reconciles the context with what happened
//! since the last call:
//!
//! 1. A state still marked in progress means the previous call was dropped
//!    mid-request. The epoch is treated as lost and the link discarded.
//! 2. A remote detach of the coordinator link kills the active epoch.
//!    Enlistments are dropped until the next boundary reports it.

use crate::config::TransactionConfig;
use crate::coordinator::CoordinatorLink;
use crate::domain::entities::PendingDelivery;
use crate::domain::errors::{CoordinatorError, TransactionError};
use crate::domain::state::{transition, FailureKind, IllegalTransition, TxnEvent, TxnState};
use crate::domain::value_objects::EnlistOutcome;
use crate::failure::{Boundary, FailureTranslator, Recovery, Verdict};
use crate::flow::ConsumerFlowController;
use crate::ports::inbound::TransactionApi;
use crate::ports::outbound::SessionWire;
use crate::tagger::TransferTagger;
use async_trait::async_trait;
use quay_telemetry::metric_inc;
use quay_telemetry::metrics::TXN_DISCHARGED;
use shared_types::entities::TxnId;
use shared_types::frames::{Frame, Transfer};
use shared_types::outcomes::{ErrorCondition, Outcome};
use tracing::{debug, info, warn};

/// Transaction state of one transacted session.
pub struct TransactionContext {
    config: TransactionConfig,
    wire: SessionWire,
    state: TxnState,
    coordinator: Option<CoordinatorLink>,
    /// Error the remote gave when it detached the coordinator mid-epoch.
    link_error: Option<ErrorCondition>,
    consumers: ConsumerFlowController,
}

impl TransactionContext {
    pub fn new(config: TransactionConfig, wire: SessionWire) -> Self {
        let consumers = ConsumerFlowController::new(wire.clone(), config.drain_timeout());
        Self {
            config,
            wire,
            state: TxnState::Unbound,
            coordinator: None,
            link_error: None,
            consumers,
        }
    }

    pub fn state(&self) -> &TxnState {
        &self.state
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn wire(&self) -> &SessionWire {
        &self.wire
    }

    pub fn consumers(&self) -> &ConsumerFlowController {
        &self.consumers
    }

    pub fn consumers_mut(&mut self) -> &mut ConsumerFlowController {
        &mut self.consumers
    }

    /// Roll back the open epoch, if any, and release every link.
    ///
    /// Never fails because of the coordinator; the outcome of the final
    /// discharge is ignored.
    pub async fn close(&mut self) -> Result<(), TransactionError> {
        if self.state == TxnState::Closed {
            return Ok(());
        }

        if let TxnState::Active(txn_id) = self.state.clone() {
            if let Some(link) = self.coordinator.as_mut() {
                if link.poll_remote() {
                    let result = link.discharge(&txn_id, true).await;
                    let verdict = FailureTranslator::discharge(Boundary::Close, result);
                    record_discharge(Boundary::Close, &verdict);
                    debug!(txn_id = %txn_id, outcome = verdict.outcome, "Open transaction discarded on close");
                }
            }
        }

        self.discard_coordinator().await;
        self.consumers.detach_all().await;
        self.apply(TxnEvent::Close)?;
        info!("Transaction context closed");
        Ok(())
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    async fn prepare(&mut self) -> Result<(), TransactionError> {
        if self.state == TxnState::Closed {
            return Err(TransactionError::SessionClosed);
        }
        self.recover_interrupted().await?;
        self.refresh_link_state().await
    }

    async fn recover_interrupted(&mut self) -> Result<(), TransactionError> {
        if !self.state.is_in_progress() {
            return Ok(());
        }
        warn!(state = %self.state, "Previous transaction call was cancelled; discarding coordinator link");
        self.apply(TxnEvent::Interrupted)?;
        self.discard_coordinator().await;
        // A cancelled rollback may have left consumers stopped.
        if let Err(e) = self.consumers.restart_all().await {
            warn!(error = %e, "Failed to restart consumers after cancelled call");
        }
        Ok(())
    }

    async fn refresh_link_state(&mut self) -> Result<(), TransactionError> {
        let Some(link) = self.coordinator.as_mut() else {
            return Ok(());
        };
        if link.poll_remote() {
            return Ok(());
        }

        let condition = link.remote_error().cloned();
        warn!(state = %self.state, error = ?condition, "Coordinator link lost");
        self.discard_coordinator().await;
        if matches!(self.state, TxnState::Active(_)) {
            self.link_error = condition;
            self.apply(TxnEvent::LinkLost)?;
        }
        Ok(())
    }

    // =========================================================================
    // EPOCHS
    // =========================================================================

    fn apply(&mut self, event: TxnEvent) -> Result<(), TransactionError> {
        let next = transition(&self.state, event)?;
        debug!(from = %self.state, to = %next, "Transaction state change");
        self.state = next;
        Ok(())
    }

    /// Transaction to enlist work in. `None` while the epoch is dead.
    async fn ensure_epoch(&mut self) -> Result<Option<TxnId>, TransactionError> {
        match &self.state {
            TxnState::Active(txn_id) => Ok(Some(txn_id.clone())),
            TxnState::Failed(FailureKind::LinkLost { .. }) => Ok(None),
            TxnState::Unbound | TxnState::Failed(FailureKind::DeclareFailed) => {
                self.apply(TxnEvent::Begin)?;
                self.declare_epoch().await.map(Some)
            }
            other => Err(IllegalTransition {
                from: other.name(),
                event: TxnEvent::Enlist.name(),
            }
            .into()),
        }
    }

    /// Declare from `Declaring`, attaching a coordinator link if there is none.
    async fn declare_epoch(&mut self) -> Result<TxnId, TransactionError> {
        if self.coordinator.is_none() {
            match CoordinatorLink::attach(self.wire.clone(), &self.config).await {
                Ok(link) => self.coordinator = Some(link),
                Err(e) => return Err(self.declare_failed(e).await),
            }
        }

        let result = match self.coordinator.as_mut() {
            Some(link) => link.declare().await,
            None => Err(CoordinatorError::LinkClosed(None)),
        };

        match result {
            Ok(txn_id) => {
                self.link_error = None;
                self.apply(TxnEvent::Declared(txn_id.clone()))?;
                Ok(txn_id)
            }
            Err(e) => Err(self.declare_failed(e).await),
        }
    }

    async fn declare_failed(&mut self, error: CoordinatorError) -> TransactionError {
        let verdict = FailureTranslator::declare_failed(&error);
        warn!(error = %error, "Transaction declare failed");

        if verdict.recovery == Recovery::ReattachAndRedeclare {
            self.discard_coordinator().await;
        }
        if let Err(illegal) = self.apply(TxnEvent::DeclareFailed) {
            return illegal;
        }
        verdict
            .error
            .unwrap_or_else(|| TransactionError::DeclareFailed(error.cause()))
    }

    async fn discharge(&mut self, txn_id: &TxnId, fail: bool) -> Result<Outcome, CoordinatorError> {
        match self.coordinator.as_mut() {
            Some(link) => link.discharge(txn_id, fail).await,
            None => Err(CoordinatorError::LinkClosed(self.link_error.clone())),
        }
    }

    /// Apply a boundary verdict up to, but not including, the redeclare.
    async fn settle(&mut self, boundary: Boundary, verdict: Verdict) -> Result<Option<TransactionError>, TransactionError> {
        record_discharge(boundary, &verdict);
        match &verdict.error {
            Some(e) => warn!(boundary = boundary.name(), state = %self.state, error = %e, "Transaction boundary failed"),
            None => info!(boundary = boundary.name(), state = %self.state, "Transaction discharged"),
        }

        if verdict.recovery == Recovery::ReattachAndRedeclare {
            self.discard_coordinator().await;
        }
        if matches!(self.state, TxnState::Committing(_) | TxnState::RollingBack(_)) {
            self.apply(TxnEvent::Discharged)?;
        }
        Ok(verdict.error)
    }

    async fn discard_coordinator(&mut self) {
        if let Some(link) = self.coordinator.take() {
            link.close().await;
        }
    }

    async fn stop_consumers(&mut self) {
        if let Err(e) = self.consumers.stop_all().await {
            warn!(error = %e, "Failed to stop consumers before rollback");
        }
    }

    async fn release_consumers(&mut self) {
        if let Err(e) = self.consumers.release_unconsumed().await {
            warn!(error = %e, "Failed to release prefetched deliveries");
        }
    }

    async fn restart_consumers(&mut self) {
        if let Err(e) = self.consumers.restart_all().await {
            warn!(error = %e, "Failed to restart consumers after rollback");
        }
    }
}

#[async_trait]
impl TransactionApi for TransactionContext {
    async fn begin(&mut self) -> Result<TxnId, TransactionError> {
        self.prepare().await?;
        match self.ensure_epoch().await? {
            Some(txn_id) => Ok(txn_id),
            // A dead epoch has to be ended by commit or rollback first.
            None => Err(IllegalTransition {
                from: self.state.name(),
                event: TxnEvent::Begin.name(),
            }
            .into()),
        }
    }

    fn current_txn_id(&self) -> Option<TxnId> {
        self.state.active_txn_id().cloned()
    }

    async fn enlist_send(&mut self, transfer: Transfer) -> Result<EnlistOutcome, TransactionError> {
        self.prepare().await?;
        let Some(txn_id) = self.ensure_epoch().await? else {
            debug!(handle = %transfer.handle, "Coordinator link lost; send dropped");
            return Ok(EnlistOutcome::Dropped);
        };

        self.apply(TxnEvent::Enlist)?;
        self.wire
            .sink
            .send(Frame::Transfer(TransferTagger::tag_send(&txn_id, transfer)))
            .await?;
        Ok(EnlistOutcome::Sent)
    }

    async fn enlist_ack(&mut self, delivery: &PendingDelivery) -> Result<EnlistOutcome, TransactionError> {
        self.prepare().await?;
        let Some(txn_id) = self.ensure_epoch().await? else {
            debug!(delivery_id = %delivery.delivery_id, "Coordinator link lost; acknowledgement dropped");
            return Ok(EnlistOutcome::Dropped);
        };

        self.apply(TxnEvent::Enlist)?;
        self.wire
            .sink
            .send(Frame::Disposition(TransferTagger::acknowledgement(
                &txn_id,
                delivery.delivery_id,
            )))
            .await?;
        Ok(EnlistOutcome::Sent)
    }

    async fn commit(&mut self) -> Result<(), TransactionError> {
        self.prepare().await?;
        if matches!(self.state, TxnState::Unbound | TxnState::Failed(FailureKind::DeclareFailed)) {
            self.ensure_epoch().await?;
        }

        let verdict = match self.state.clone() {
            TxnState::Active(txn_id) => {
                self.apply(TxnEvent::Commit)?;
                let result = self.discharge(&txn_id, false).await;
                FailureTranslator::discharge(Boundary::Commit, result)
            }
            TxnState::Failed(FailureKind::LinkLost { .. }) => {
                self.apply(TxnEvent::Commit)?;
                FailureTranslator::link_lost(Boundary::Commit, self.link_error.take())
            }
            other => {
                return Err(IllegalTransition {
                    from: other.name(),
                    event: TxnEvent::Commit.name(),
                }
                .into())
            }
        };

        let failed = self.settle(Boundary::Commit, verdict).await?;
        let redeclared = self.declare_epoch().await;
        combine(failed, redeclared)
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.prepare().await?;
        if matches!(self.state, TxnState::Unbound | TxnState::Failed(FailureKind::DeclareFailed)) {
            self.ensure_epoch().await?;
        }

        let verdict = match self.state.clone() {
            TxnState::Active(txn_id) => {
                self.apply(TxnEvent::Rollback)?;
                self.stop_consumers().await;
                let result = self.discharge(&txn_id, true).await;
                FailureTranslator::discharge(Boundary::Rollback, result)
            }
            TxnState::Failed(FailureKind::LinkLost { .. }) => {
                self.apply(TxnEvent::Rollback)?;
                self.stop_consumers().await;
                FailureTranslator::link_lost(Boundary::Rollback, self.link_error.take())
            }
            other => {
                return Err(IllegalTransition {
                    from: other.name(),
                    event: TxnEvent::Rollback.name(),
                }
                .into())
            }
        };

        let failed = self.settle(Boundary::Rollback, verdict).await?;
        self.release_consumers().await;
        let redeclared = self.declare_epoch().await;
        self.restart_consumers().await;
        combine(failed, redeclared)
    }
}

fn record_discharge(boundary: Boundary, verdict: &Verdict) {
    metric_inc!(TXN_DISCHARGED, &[boundary.name(), verdict.outcome]);
}

/// The boundary's own failure wins over a failed redeclare.
fn combine(failed: Option<TransactionError>, redeclared: Result<TxnId, TransactionError>) -> Result<(), TransactionError> {
    match (failed, redeclared) {
        (Some(e), Err(secondary)) => {
            warn!(error = %secondary, "Redeclare after failed boundary also failed");
            Err(e)
        }
        (Some(e), Ok(_)) => Err(e),
        (None, Err(e)) => Err(e),
        (None, Ok(_)) => Ok(()),
    }
}
