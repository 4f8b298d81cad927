//! In-memory storage layer
//!
//! Each store owns one concern behind `DashMap` sharded locks: user
//! identities, credit accounts and their transaction log, the lead pool, and
//! payment orders. All cross-store coordination lives in the engine layer.

pub mod directory;
pub mod ledger;
pub mod leads;
pub mod orders;

pub use directory::UserDirectory;
pub use ledger::LedgerStore;
pub use leads::{LeadStore, Pagination};
pub use orders::{OrderStore, PaidOutcome};
