//! Types module
//!
//! Contains core data structures used throughout the engine.
//! This module organizes types into logical submodules:
//! - `account`: tutor credit account state
//! - `user`: user identity and tutor/student/admin role payloads
//! - `lead`: lead documents and the lead state machine
//! - `transaction`: immutable credit ledger entries
//! - `payment`: payment orders, packages, and tax breakdowns
//! - `error`: error types for the engine

pub mod account;
pub mod error;
pub mod lead;
pub mod payment;
pub mod transaction;
pub mod user;

pub use account::CreditAccount;
pub use error::EngineError;
pub use lead::{
    BudgetRange, Lead, LeadId, LeadStatus, LockInfo, Priority, Requirements, StudentContact,
    TeachingMode,
};
pub use payment::{
    CreditPackage, FailureDetail, OrderStatus, PaymentOrder, PaymentPurpose, RefundDetail,
    TaxBreakdown,
};
pub use transaction::{
    CreditTransaction, OrderRef, TransactionDraft, TransactionType, generate_txn_id,
    purchase_txn_id,
};
pub use user::{Role, StudentProfile, TutorMetrics, TutorProfile, UserId, UserRecord};
