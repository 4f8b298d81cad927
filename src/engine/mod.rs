//! Credit engine: orchestration of leads, ledger, and notifications

pub mod credit_engine;

pub use credit_engine::{CreditEngine, UnlockReceipt};
