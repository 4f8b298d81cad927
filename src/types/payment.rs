//! Payment order types
//!
//! A payment order tracks one gateway order from creation to its terminal
//! state. The invariant that matters is single crediting: exactly one
//! successful credit grant per order, no matter how many verification or
//! webhook calls arrive. The order store enforces it with a
//! compare-and-swap on `status`; the types here just carry the state.

use super::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment order lifecycle status
///
/// `created → attempted → paid` is the success path; `failed`, `refunded`,
/// and `cancelled` are the off-ramps. An order reaches `paid` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order created, no payment attempt yet
    Created,
    /// Client started a payment attempt
    Attempted,
    /// Payment captured; credits granted
    Paid,
    /// Gateway reported the payment failed
    Failed,
    /// Payment refunded after capture
    Refunded,
    /// Order cancelled before capture
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "created",
            OrderStatus::Attempted => "attempted",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What an order pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// Credit package purchase
    CreditPurchase,
    /// Recurring subscription charge
    Subscription,
    /// Featured-placement boost
    FeaturedBoost,
}

/// A fixed credit package tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Package name (e.g. "starter")
    pub name: String,
    /// Credits granted
    pub credits: i64,
    /// Base price in rupees, before tax
    pub price: Decimal,
    /// Marketing discount percentage baked into the price
    pub discount_percent: u8,
}

/// GST breakdown on an order
///
/// A flat percentage surcharge on the base price, rounded to whole rupees
/// and split evenly into CGST and SGST. Reproduced exactly for invoice
/// correctness.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// Central GST half
    pub cgst: Decimal,
    /// State GST half
    pub sgst: Decimal,
    /// Total tax
    pub total: Decimal,
}

impl TaxBreakdown {
    /// Compute the flat surcharge on `base` at `rate`
    ///
    /// The total is rounded half-away-from-zero to whole rupees, then
    /// halved into the two components.
    pub fn flat(base: Decimal, rate: Decimal) -> Self {
        let total = (base * rate).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let half = total / Decimal::from(2);
        TaxBreakdown {
            cgst: half,
            sgst: half,
            total,
        }
    }
}

/// Failure detail reported by the gateway
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Gateway error code
    pub code: Option<String>,
    /// Human-readable description
    pub description: Option<String>,
    /// Failure source reported by the gateway
    pub source: Option<String>,
    /// Step at which the payment failed
    pub step: Option<String>,
    /// Failure reason
    pub reason: Option<String>,
}

/// Refund detail recorded after a processed refund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundDetail {
    /// Refunded amount in rupees
    pub amount: Decimal,
    /// Refund reason
    pub reason: String,
    /// Gateway refund identifier
    pub gateway_refund_id: Option<String>,
    /// When the refund was processed
    pub processed_at: DateTime<Utc>,
}

/// A payment order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Gateway order identifier (unique)
    pub order_id: String,
    /// Gateway payment identifier, set once captured (unique when present)
    pub payment_id: Option<String>,
    /// User who initiated the purchase
    pub user: UserId,
    /// What the order pays for
    pub purpose: PaymentPurpose,
    /// Total amount in rupees, tax included
    pub amount: Decimal,
    /// Currency code
    pub currency: String,
    /// Credits this order grants (credit purchases only)
    pub credits_purchased: i64,
    /// Originating package descriptor (credit purchases only)
    pub package: Option<CreditPackage>,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Tax breakdown
    pub tax: TaxBreakdown,
    /// Failure detail, if the gateway reported one
    pub failure: Option<FailureDetail>,
    /// Refund detail, if refunded
    pub refund: Option<RefundDetail>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the payment was captured
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::starter(500, 90)]
    #[case::popular(1000, 180)]
    #[case::premium(2000, 360)]
    #[case::enterprise(5000, 900)]
    fn test_flat_tax_tiers(#[case] base: i64, #[case] expected_total: i64) {
        let tax = TaxBreakdown::flat(Decimal::from(base), Decimal::new(18, 2));
        assert_eq!(tax.total, Decimal::from(expected_total));
        assert_eq!(tax.cgst + tax.sgst, tax.total);
        assert_eq!(tax.cgst, tax.sgst);
    }

    #[test]
    fn test_flat_tax_rounds_half_up() {
        // 18% of 475 is 85.5, which rounds away from zero to 86.
        let tax = TaxBreakdown::flat(Decimal::from(475), Decimal::new(18, 2));
        assert_eq!(tax.total, Decimal::from(86));
        assert_eq!(tax.cgst, Decimal::from(43));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OrderStatus::Created.to_string(), "created");
        assert_eq!(OrderStatus::Paid.to_string(), "paid");
    }
}
