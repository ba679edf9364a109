//! # Quay Transactions
//!
//! Transaction coordination for a transacted session: the coordinator link
//! control protocol, transactional tagging of transfers and dispositions, and
//! consumer credit handling around rollback.
//!
//! ## Architecture
//!
//! - **Domain**: transaction state machine, consumer flow states, errors
//! - **Ports**: Inbound (`TransactionApi`) and Outbound (`FrameSink`)
//! - **Components**: `CoordinatorLink`, `TransferTagger`, `ConsumerFlowController`,
//!   `FailureTranslator`
//! - **Application**: `TransactionContext` and the `TransactedSession` facade
//!
//! ## Epoch lifecycle
//!
//! ```text
//!            begin            Declared{txn}
//! [UNBOUND] ──────► [DECLARING] ──────────► [ACTIVE] ──commit──► [COMMITTING] ──┐
//!     ▲                  ▲  │                  │ └────rollback─► [ROLLING_BACK] ─┤
//!     │                  │  └─declare failed─┐ │ link lost                      │
//!     │                  │                   ▼ ▼                                │
//!     │                  └──────begin──── [FAILED]                              │
//!     │                  └──────────────────────────── discharged ──────────────┘
//!   close ──► [CLOSED]
//! ```
//!
//! Every boundary re-arms the context: after commit or rollback, successful
//! or not, a fresh Declare is issued before the call returns.

pub mod application;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod failure;
pub mod flow;
pub mod ports;
pub mod tagger;

pub use application::service::TransactionContext;
pub use application::session::TransactedSession;
pub use config::{ConfigError, TransactionConfig};
pub use coordinator::CoordinatorLink;
pub use domain::entities::*;
pub use domain::errors::*;
pub use domain::state::{transition, IllegalTransition, TxnEvent, TxnState};
pub use domain::value_objects::*;
pub use failure::{Boundary, FailureTranslator, Recovery, Verdict};
pub use flow::ConsumerFlowController;
pub use ports::inbound::TransactionApi;
pub use ports::outbound::{FrameSink, SessionWire};
pub use tagger::TransferTagger;
