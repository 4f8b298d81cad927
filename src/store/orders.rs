//! Order store: payment orders and the paid-status compare-and-swap
//!
//! The single most important operation here is `mark_paid_if_unpaid`. The
//! gateway can announce a successful payment twice — once through the
//! client-initiated verification call and once through the webhook — in
//! either order, or only one of the two. Both paths funnel through the same
//! CAS on the order's status, so exactly one of them observes the capture
//! and triggers crediting; the other sees `AlreadyPaid` and does nothing.

use crate::types::payment::{FailureDetail, OrderStatus, PaymentOrder, RefundDetail};
use crate::types::EngineError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Outcome of the paid-status compare-and-swap
#[derive(Debug, Clone, PartialEq)]
pub enum PaidOutcome {
    /// This call won the CAS; the caller must now grant credits
    Captured(PaymentOrder),
    /// The order was already paid; the caller must do nothing
    AlreadyPaid(PaymentOrder),
}

/// Durable storage of payment orders, keyed by gateway order id
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: DashMap<String, PaymentOrder>,
}

impl OrderStore {
    /// Create an empty order store
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a freshly created order
    pub fn insert(&self, order: PaymentOrder) {
        self.orders.insert(order.order_id.clone(), order);
    }

    /// Fetch an order snapshot
    pub fn get(&self, order_id: &str) -> Result<PaymentOrder, EngineError> {
        self.orders
            .get(order_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| EngineError::order_not_found(order_id))
    }

    /// Record that the client started a payment attempt
    ///
    /// Only moves `created → attempted`; any other status is left alone.
    pub fn mark_attempted(&self, order_id: &str) -> Result<PaymentOrder, EngineError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::order_not_found(order_id))?;
        if entry.status == OrderStatus::Created {
            entry.status = OrderStatus::Attempted;
        }
        Ok(entry.clone())
    }

    /// Compare-and-swap the order to `paid`
    ///
    /// `created`, `attempted`, and `failed` all capture (a failed attempt
    /// may be retried and succeed); `paid` and `refunded` report
    /// `AlreadyPaid` so replays stay side-effect free; a `cancelled` order
    /// cannot be captured at all.
    pub fn mark_paid_if_unpaid(
        &self,
        order_id: &str,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaidOutcome, EngineError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::order_not_found(order_id))?;

        match entry.status {
            OrderStatus::Created | OrderStatus::Attempted | OrderStatus::Failed => {
                entry.status = OrderStatus::Paid;
                entry.payment_id = Some(payment_id.to_string());
                entry.paid_at = Some(now);
                entry.failure = None;
                Ok(PaidOutcome::Captured(entry.clone()))
            }
            OrderStatus::Paid | OrderStatus::Refunded => {
                Ok(PaidOutcome::AlreadyPaid(entry.clone()))
            }
            OrderStatus::Cancelled => Err(EngineError::invalid_order_state(
                order_id,
                "capture",
                OrderStatus::Cancelled,
            )),
        }
    }

    /// Record a gateway-reported payment failure
    ///
    /// A failure notification arriving after a successful capture is
    /// ignored; the paid status wins.
    pub fn record_failure(
        &self,
        order_id: &str,
        detail: FailureDetail,
    ) -> Result<PaymentOrder, EngineError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::order_not_found(order_id))?;

        if matches!(
            entry.status,
            OrderStatus::Created | OrderStatus::Attempted
        ) {
            entry.status = OrderStatus::Failed;
            entry.failure = Some(detail);
        }
        Ok(entry.clone())
    }

    /// Record a processed refund on a paid order
    pub fn record_refund(
        &self,
        order_id: &str,
        detail: RefundDetail,
    ) -> Result<PaymentOrder, EngineError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::order_not_found(order_id))?;

        if entry.status != OrderStatus::Paid {
            return Err(EngineError::invalid_order_state(
                order_id,
                "refund",
                entry.status,
            ));
        }

        entry.status = OrderStatus::Refunded;
        entry.refund = Some(detail);
        Ok(entry.clone())
    }
}
