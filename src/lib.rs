//! TutorBridge Lead-Credit Engine
//! # Overview
//!
//! This library implements the credit economy of a tutoring marketplace:
//! tutors buy credits through a payment gateway and spend them to unlock
//! exclusive, time-boxed access to student leads.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (leads, ledger entries, orders, errors)
//! - [`config`] - TOML-backed engine configuration
//! - [`store`] - In-memory storage:
//!   - [`store::directory`] - User identities and tutor profiles
//!   - [`store::ledger`] - Credit balances and the append-only ledger
//!   - [`store::leads`] - Lead documents and CAS state transitions
//!   - [`store::orders`] - Payment orders and the paid-status CAS
//! - [`engine`] - The orchestrating [`engine::CreditEngine`]
//! - [`payment`] - Gateway client, HMAC signatures, reconciliation
//! - [`sweeper`] - Periodic lock expiry and maintenance jobs
//! - [`notify`] - Best-effort event sinks
//! - [`io`] / [`replay`] / [`cli`] - The replay binary's CSV pipeline
//!
//! # Core Guarantees
//!
//! - **Atomic unlock**: a tutor is charged if and only if they win the
//!   exclusive lock on the lead; racing tutors get exactly one winner
//! - **Single crediting**: a payment order grants credits exactly once,
//!   whether the verification call or the webhook lands first (or both)
//! - **Replayable ledger**: replaying any tutor's ledger entries from zero
//!   reproduces their live balance
//! - **Expiry without refund**: lapsed locks return the lead to the pool
//!   but never return credits

// Module declarations
pub mod cli;
pub mod config;
pub mod engine;
pub mod io;
pub mod notify;
pub mod payment;
pub mod replay;
pub mod store;
pub mod sweeper;
pub mod types;

pub use config::EngineConfig;
pub use engine::{CreditEngine, UnlockReceipt};
pub use io::write_balances_csv;
pub use payment::{PaymentGateway, PaymentService, SandboxGateway};
pub use store::{LeadStore, LedgerStore, OrderStore, UserDirectory};
pub use types::{
    CreditAccount, CreditTransaction, EngineError, Lead, LeadId, LeadStatus, PaymentOrder,
    TransactionType, UserId,
};
