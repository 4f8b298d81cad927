//! Error types for the lead-credit engine
//!
//! This module defines all error types that can occur while mutating credit
//! balances, lead state, or payment orders. Errors are designed to be
//! descriptive enough for the request layer to map them to user-facing
//! messages without extra lookups.
//!
//! # Error Categories
//!
//! - **Lookup Errors**: tutor, lead, or payment order missing
//! - **State Errors**: illegal lead transitions, unapproved tutors
//! - **Balance Errors**: insufficient credits, invalid amounts
//! - **Idempotency Guards**: duplicate unlocks, refunds, and order replays
//! - **Payment Errors**: bad signatures, unknown packages, gateway failures
//! - **Replay I/O Errors**: CSV parsing and file I/O for the replay binary

use super::lead::{LeadId, LeadStatus};
use super::user::UserId;
use thiserror::Error;

/// Main error type for the lead-credit engine
///
/// Every fallible operation in the engine, stores, and payment
/// reconciliation service reports one of these variants. Engine failures
/// abort the atomic unit they occur in and propagate verbatim; only
/// notification-sink failures are swallowed (and logged) by callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Tutor is not registered in the user directory
    #[error("Tutor {tutor} not found")]
    TutorNotFound {
        /// Tutor identifier that was not found
        tutor: UserId,
    },

    /// Lead does not exist in the lead store
    #[error("Lead {lead} not found")]
    LeadNotFound {
        /// Lead identifier that was not found
        lead: LeadId,
    },

    /// Payment order does not exist in the order store
    #[error("Payment order {order} not found")]
    OrderNotFound {
        /// Gateway order identifier that was not found
        order: String,
    },

    /// Tutor exists but has not been approved for lead access
    #[error("Tutor {tutor} is not approved yet")]
    NotApproved {
        /// Tutor identifier
        tutor: UserId,
    },

    /// Lead is not in a state that allows the requested operation
    ///
    /// This is what the loser of a concurrent unlock race observes: the
    /// compare-and-swap on `status == Active` fails and no credits are
    /// deducted.
    #[error("Lead {lead} is no longer available (status: {status})")]
    LeadUnavailable {
        /// Lead identifier
        lead: LeadId,
        /// Status the lead was found in
        status: LeadStatus,
    },

    /// Illegal lead state transition attempted
    #[error("Cannot {operation} lead {lead}: expected status {expected}, found {found}")]
    InvalidState {
        /// Lead identifier
        lead: LeadId,
        /// Operation that was attempted
        operation: String,
        /// Status the transition requires
        expected: LeadStatus,
        /// Status the lead was actually in
        found: LeadStatus,
    },

    /// Payment order is not in a state that allows the requested operation
    #[error("Cannot {operation} order {order}: status is {status}")]
    InvalidOrderState {
        /// Gateway order identifier
        order: String,
        /// Operation that was attempted
        operation: String,
        /// Status the order was found in
        status: crate::types::payment::OrderStatus,
    },

    /// Tutor balance cannot cover the requested deduction
    ///
    /// Surfaces required vs available so the request layer can render a
    /// useful message. The balance is left unchanged.
    #[error("Insufficient credits for tutor {tutor}: required {required}, available {available}")]
    InsufficientBalance {
        /// Tutor identifier
        tutor: UserId,
        /// Credits the operation needs
        required: i64,
        /// Credits currently available
        available: i64,
    },

    /// Tutor has already unlocked this exact lead
    ///
    /// Enforced by the unique (tutor, lead, unlock) index in the ledger,
    /// independent of the lead's current status, so a lead that cycled back
    /// to active cannot be billed twice to the same tutor.
    #[error("Tutor {tutor} has already unlocked lead {lead}")]
    AlreadyUnlocked {
        /// Tutor identifier
        tutor: UserId,
        /// Lead identifier
        lead: LeadId,
    },

    /// Credits for this (tutor, lead) pair were already refunded
    #[error("Credits already refunded to tutor {tutor} for lead {lead}")]
    AlreadyRefunded {
        /// Tutor identifier
        tutor: UserId,
        /// Lead identifier
        lead: LeadId,
    },

    /// No prior unlock transaction exists for this (tutor, lead) pair
    #[error("No unlock transaction found for tutor {tutor} on lead {lead}")]
    NoUnlockFound {
        /// Tutor identifier
        tutor: UserId,
        /// Lead identifier
        lead: LeadId,
    },

    /// Payment order was already credited
    ///
    /// Returned when a purchase is replayed for an order that has already
    /// granted its credits. Safe to treat as success by idempotent callers.
    #[error("Order {order} has already been processed")]
    AlreadyProcessed {
        /// Gateway order identifier
        order: String,
    },

    /// A ledger entry with this transaction id already exists
    #[error("Duplicate transaction id {id}")]
    DuplicateTransaction {
        /// Transaction identifier that collided
        id: String,
    },

    /// HMAC signature did not match the supplied one
    ///
    /// Raised by both the client verification path and the webhook path.
    /// The HTTP layer still answers the gateway with a 200-class response
    /// to stop retry storms; the event itself is rejected.
    #[error("Invalid payment signature")]
    InvalidSignature,

    /// Unknown credit package identifier
    #[error("Invalid credit package '{package}'")]
    InvalidPackage {
        /// Package name that was requested
        package: String,
    },

    /// Amount fails validation (e.g. non-positive bonus)
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// Offending amount
        amount: i64,
        /// Why the amount was rejected
        reason: String,
    },

    /// Payment gateway call failed or timed out
    #[error("Payment gateway error: {message}")]
    ExternalServiceError {
        /// Description of the gateway failure
        message: String,
        /// Whether the caller may retry the call
        retryable: bool,
    },

    /// CSV parsing error in the replay input
    ///
    /// Recoverable: the malformed row is skipped and replay continues.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// I/O error while reading replay input or writing output
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        EngineError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl EngineError {
    /// Create a TutorNotFound error
    pub fn tutor_not_found(tutor: UserId) -> Self {
        EngineError::TutorNotFound { tutor }
    }

    /// Create a LeadNotFound error
    pub fn lead_not_found(lead: LeadId) -> Self {
        EngineError::LeadNotFound { lead }
    }

    /// Create an OrderNotFound error
    pub fn order_not_found(order: &str) -> Self {
        EngineError::OrderNotFound {
            order: order.to_string(),
        }
    }

    /// Create a NotApproved error
    pub fn not_approved(tutor: UserId) -> Self {
        EngineError::NotApproved { tutor }
    }

    /// Create a LeadUnavailable error
    pub fn lead_unavailable(lead: LeadId, status: LeadStatus) -> Self {
        EngineError::LeadUnavailable { lead, status }
    }

    /// Create an InvalidState error
    pub fn invalid_state(
        lead: LeadId,
        operation: &str,
        expected: LeadStatus,
        found: LeadStatus,
    ) -> Self {
        EngineError::InvalidState {
            lead,
            operation: operation.to_string(),
            expected,
            found,
        }
    }

    /// Create an InvalidOrderState error
    pub fn invalid_order_state(
        order: &str,
        operation: &str,
        status: crate::types::payment::OrderStatus,
    ) -> Self {
        EngineError::InvalidOrderState {
            order: order.to_string(),
            operation: operation.to_string(),
            status,
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(tutor: UserId, required: i64, available: i64) -> Self {
        EngineError::InsufficientBalance {
            tutor,
            required,
            available,
        }
    }

    /// Create an AlreadyUnlocked error
    pub fn already_unlocked(tutor: UserId, lead: LeadId) -> Self {
        EngineError::AlreadyUnlocked { tutor, lead }
    }

    /// Create an AlreadyRefunded error
    pub fn already_refunded(tutor: UserId, lead: LeadId) -> Self {
        EngineError::AlreadyRefunded { tutor, lead }
    }

    /// Create a NoUnlockFound error
    pub fn no_unlock_found(tutor: UserId, lead: LeadId) -> Self {
        EngineError::NoUnlockFound { tutor, lead }
    }

    /// Create an AlreadyProcessed error
    pub fn already_processed(order: &str) -> Self {
        EngineError::AlreadyProcessed {
            order: order.to_string(),
        }
    }

    /// Create a DuplicateTransaction error
    pub fn duplicate_transaction(id: &str) -> Self {
        EngineError::DuplicateTransaction { id: id.to_string() }
    }

    /// Create an InvalidPackage error
    pub fn invalid_package(package: &str) -> Self {
        EngineError::InvalidPackage {
            package: package.to_string(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: i64, reason: &str) -> Self {
        EngineError::InvalidAmount {
            amount,
            reason: reason.to_string(),
        }
    }

    /// Create an ExternalServiceError
    pub fn external(message: &str, retryable: bool) -> Self {
        EngineError::ExternalServiceError {
            message: message.to_string(),
            retryable,
        }
    }

    /// Whether a retry of the failed operation may succeed
    ///
    /// Only gateway timeouts and transient gateway failures are retryable;
    /// every other variant is a deterministic rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ExternalServiceError {
                retryable: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::tutor_not_found(
        EngineError::tutor_not_found(7),
        "Tutor 7 not found"
    )]
    #[case::lead_not_found(
        EngineError::lead_not_found(42),
        "Lead 42 not found"
    )]
    #[case::not_approved(
        EngineError::not_approved(3),
        "Tutor 3 is not approved yet"
    )]
    #[case::lead_unavailable(
        EngineError::lead_unavailable(42, LeadStatus::Locked),
        "Lead 42 is no longer available (status: locked)"
    )]
    #[case::invalid_state(
        EngineError::invalid_state(42, "convert", LeadStatus::Locked, LeadStatus::Active),
        "Cannot convert lead 42: expected status locked, found active"
    )]
    #[case::insufficient_balance(
        EngineError::insufficient_balance(7, 10, 5),
        "Insufficient credits for tutor 7: required 10, available 5"
    )]
    #[case::already_unlocked(
        EngineError::already_unlocked(7, 42),
        "Tutor 7 has already unlocked lead 42"
    )]
    #[case::already_refunded(
        EngineError::already_refunded(7, 42),
        "Credits already refunded to tutor 7 for lead 42"
    )]
    #[case::no_unlock_found(
        EngineError::no_unlock_found(7, 42),
        "No unlock transaction found for tutor 7 on lead 42"
    )]
    #[case::already_processed(
        EngineError::already_processed("order_abc"),
        "Order order_abc has already been processed"
    )]
    #[case::invalid_order_state(
        EngineError::invalid_order_state(
            "order_abc",
            "refund",
            crate::types::payment::OrderStatus::Created
        ),
        "Cannot refund order order_abc: status is created"
    )]
    #[case::invalid_signature(
        EngineError::InvalidSignature,
        "Invalid payment signature"
    )]
    #[case::invalid_package(
        EngineError::invalid_package("mega"),
        "Invalid credit package 'mega'"
    )]
    #[case::invalid_amount(
        EngineError::invalid_amount(-5, "bonus must be positive"),
        "Invalid amount -5: bonus must be positive"
    )]
    #[case::parse_error_with_line(
        EngineError::ParseError { line: Some(4), message: "bad field".to_string() },
        "CSV parse error at line 4: bad field"
    )]
    #[case::parse_error_without_line(
        EngineError::ParseError { line: None, message: "bad field".to_string() },
        "CSV parse error: bad field"
    )]
    fn test_error_display(#[case] error: EngineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::external("gateway timed out", true).is_retryable());
        assert!(!EngineError::external("order rejected", false).is_retryable());
        assert!(!EngineError::InvalidSignature.is_retryable());
        assert!(!EngineError::insufficient_balance(1, 10, 0).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: EngineError = io_error.into();
        assert!(matches!(error, EngineError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
