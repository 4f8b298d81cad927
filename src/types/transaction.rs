//! Credit ledger entry types
//!
//! Every credit-affecting operation appends exactly one immutable
//! `CreditTransaction` to a tutor's ledger. Replaying a tutor's entries in
//! creation order from zero must reproduce the live balance; the
//! `balance_after` snapshot of the last entry equals the current balance.
//!
//! Entries are built from a `TransactionDraft`: the draft carries everything
//! known before the balance mutation, and the ledger store fills in
//! `balance_after` under the same lock that mutates the account.

use super::lead::LeadId;
use super::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ledger entry types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credits bought through the payment gateway
    Purchase,
    /// Credits spent to unlock a lead (the only negative type)
    Unlock,
    /// Credits returned for a bad lead
    Refund,
    /// Promotional or compensatory credits
    Bonus,
    /// Marker entries written by expiry housekeeping
    Expiry,
    /// Manual balance adjustment by an admin
    Adjustment,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Unlock => "unlock",
            TransactionType::Refund => "refund",
            TransactionType::Bonus => "bonus",
            TransactionType::Expiry => "expiry",
            TransactionType::Adjustment => "adjustment",
        };
        f.write_str(s)
    }
}

/// Reference to the gateway order that funded a purchase entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRef {
    /// Gateway order identifier
    pub order_id: String,
    /// Gateway payment identifier, once captured
    pub payment_id: Option<String>,
}

/// Immutable credit ledger entry
///
/// Created once, never mutated or deleted. Signed `amount` is negative only
/// for `Unlock` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction identifier (`TXN-` prefixed)
    pub id: String,
    /// Owning tutor
    pub tutor: UserId,
    /// Entry type
    pub tx_type: TransactionType,
    /// Signed credit delta
    pub amount: i64,
    /// Balance snapshot after applying this entry
    pub balance_after: i64,
    /// Human-readable description
    pub description: String,
    /// Lead this entry relates to, if any
    pub related_lead: Option<LeadId>,
    /// Payment order this entry relates to, if any
    pub related_order: Option<OrderRef>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Everything known about a ledger entry before the balance mutation
///
/// The ledger store turns a draft into a `CreditTransaction` atomically
/// with the balance change, filling in `balance_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    /// Transaction identifier; deterministic for purchases, random otherwise
    pub id: String,
    /// Entry type
    pub tx_type: TransactionType,
    /// Signed credit delta to apply
    pub amount: i64,
    /// Human-readable description
    pub description: String,
    /// Related lead, if any
    pub related_lead: Option<LeadId>,
    /// Related payment order, if any
    pub related_order: Option<OrderRef>,
}

impl TransactionDraft {
    /// Draft for an unlock deduction
    pub fn unlock(lead: LeadId, lead_ref: &str, cost: i64) -> Self {
        TransactionDraft {
            id: generate_txn_id(),
            tx_type: TransactionType::Unlock,
            amount: -cost,
            description: format!("Unlocked lead {}", lead_ref),
            related_lead: Some(lead),
            related_order: None,
        }
    }

    /// Draft for a refund of an earlier unlock
    pub fn refund(lead: LeadId, amount: i64, reason: &str) -> Self {
        TransactionDraft {
            id: generate_txn_id(),
            tx_type: TransactionType::Refund,
            amount,
            description: format!("Refund for lead {}: {}", lead, reason),
            related_lead: Some(lead),
            related_order: None,
        }
    }

    /// Draft for a bonus grant
    pub fn bonus(amount: i64, reason: &str) -> Self {
        TransactionDraft {
            id: generate_txn_id(),
            tx_type: TransactionType::Bonus,
            amount,
            description: format!("Bonus: {}", reason),
            related_lead: None,
            related_order: None,
        }
    }

    /// Draft for a gateway-funded purchase
    ///
    /// Uses the deterministic per-order id, so replaying the same order
    /// collides in the ledger and surfaces as `AlreadyProcessed`.
    pub fn purchase(
        order_id: &str,
        payment_id: Option<&str>,
        credits: i64,
        amount_paid: Decimal,
    ) -> Self {
        TransactionDraft {
            id: purchase_txn_id(order_id),
            tx_type: TransactionType::Purchase,
            amount: credits,
            description: format!("Purchased {} credits for ₹{}", credits, amount_paid),
            related_lead: None,
            related_order: Some(OrderRef {
                order_id: order_id.to_string(),
                payment_id: payment_id.map(str::to_string),
            }),
        }
    }

    /// Draft for a manual adjustment
    pub fn adjustment(amount: i64, reason: &str) -> Self {
        TransactionDraft {
            id: generate_txn_id(),
            tx_type: TransactionType::Adjustment,
            amount,
            description: format!("Adjustment: {}", reason),
            related_lead: None,
            related_order: None,
        }
    }
}

/// Generate a random transaction identifier
pub fn generate_txn_id() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TXN-{}", &raw[..12])
}

/// Deterministic transaction identifier for a purchase order
///
/// One order can only ever fund one ledger entry; deriving the id from the
/// order id makes the ledger's uniqueness check the idempotency guard.
pub fn purchase_txn_id(order_id: &str) -> String {
    format!("TXN-PUR-{}", order_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_draft_is_negative() {
        let draft = TransactionDraft::unlock(42, "TB-ABCD1234", 10);
        assert_eq!(draft.tx_type, TransactionType::Unlock);
        assert_eq!(draft.amount, -10);
        assert_eq!(draft.related_lead, Some(42));
        assert!(draft.id.starts_with("TXN-"));
        assert_eq!(draft.description, "Unlocked lead TB-ABCD1234");
    }

    #[test]
    fn test_purchase_draft_deterministic_id() {
        let a = TransactionDraft::purchase("ORD123", Some("pay_9"), 50, Decimal::from(590));
        let b = TransactionDraft::purchase("ORD123", Some("pay_9"), 50, Decimal::from(590));
        assert_eq!(a.id, "TXN-PUR-ORD123");
        assert_eq!(a.id, b.id);
        assert_eq!(a.description, "Purchased 50 credits for ₹590");
        assert_eq!(
            a.related_order.unwrap().payment_id.as_deref(),
            Some("pay_9")
        );
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(generate_txn_id(), generate_txn_id());
    }
}
