//! Payment reconciliation
//!
//! `PaymentService` owns the full life of a credit purchase: create the
//! gateway order, then turn whichever success notification arrives first
//! (client verification or webhook) into exactly one credit grant.
//!
//! Both success paths share one compare-and-swap on the order's status, so
//! the outcome does not depend on delivery order or duplication: the first
//! notification captures and credits, every later one observes
//! `AlreadyPaid` and does nothing. A webhook that arrives when the client
//! never calls verify still credits the tutor.

use crate::engine::CreditEngine;
use crate::payment::gateway::PaymentGateway;
use crate::payment::signature;
use crate::store::{OrderStore, PaidOutcome};
use crate::types::payment::{
    FailureDetail, OrderStatus, PaymentOrder, PaymentPurpose, RefundDetail, TaxBreakdown,
};
use crate::types::user::UserId;
use crate::types::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a client-initiated payment verification
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOutcome {
    /// The order after verification
    pub order: PaymentOrder,
    /// Whether this call granted the credits (false on a replay)
    pub credited: bool,
}

/// What a webhook delivery amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Payment captured and credits granted by this delivery
    Credited(PaymentOrder),
    /// Payment was already processed; nothing changed
    AlreadyProcessed,
    /// Gateway-reported failure recorded on the order
    FailureRecorded,
    /// Processed refund recorded on the order
    RefundRecorded,
    /// Subscription charge marked paid on its order
    SubscriptionRecorded,
    /// Event type carries no engine-side effect
    Ignored,
}

/// Orchestrates orders, gateway calls, and credit grants
pub struct PaymentService {
    engine: Arc<CreditEngine>,
    orders: Arc<OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    /// Create a service over shared stores and a gateway client
    pub fn new(
        engine: Arc<CreditEngine>,
        orders: Arc<OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        PaymentService {
            engine,
            orders,
            gateway,
        }
    }

    /// The shared order store
    pub fn orders(&self) -> &Arc<OrderStore> {
        &self.orders
    }

    /// Create a gateway order for a credit package
    ///
    /// Prices the package (base price plus flat tax), asks the gateway for
    /// an order, and persists it in `created` status. The gateway call is
    /// bounded by the configured timeout; hitting it surfaces as a
    /// retryable `ExternalServiceError` and nothing is persisted.
    pub async fn create_credit_order(
        &self,
        tutor: UserId,
        package_name: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentOrder, EngineError> {
        // Order creation is tutor-only; the profile lookup enforces it.
        self.engine.directory().tutor_profile(tutor)?;

        let config = self.engine.config();
        let package = config
            .package(package_name)
            .ok_or_else(|| EngineError::invalid_package(package_name))?;

        let tax = TaxBreakdown::flat(package.price, config.tax_rate);
        let amount = package.price + tax.total;
        let receipt = format!(
            "rcpt-{}",
            &Uuid::new_v4().simple().to_string()[..10]
        );

        // The gateway deals in minor units (paise); the engine in rupees.
        let gateway_order = tokio::time::timeout(
            config.gateway_timeout(),
            self.gateway
                .create_order(amount * Decimal::from(100), &config.currency, &receipt),
        )
        .await
        .map_err(|_| EngineError::external("gateway order creation timed out", true))??;

        let order = PaymentOrder {
            order_id: gateway_order.id,
            payment_id: None,
            user: tutor,
            purpose: PaymentPurpose::CreditPurchase,
            amount,
            currency: config.currency.clone(),
            credits_purchased: package.credits,
            package: Some(package),
            status: OrderStatus::Created,
            tax,
            failure: None,
            refund: None,
            created_at: now,
            paid_at: None,
        };
        self.orders.insert(order.clone());

        info!(tutor, order_id = %order.order_id, %amount, "credit order created");
        Ok(order)
    }

    /// Process a client-reported successful payment
    ///
    /// Verifies the HMAC signature over `"{order_id}|{payment_id}"` and
    /// runs the paid-status CAS. The winner grants credits; a replay (or a
    /// webhook that got there first) returns `credited: false` with the
    /// unchanged order.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound` for an unknown order id
    /// - `InvalidSignature` on a signature mismatch; no state changes
    pub fn verify_and_process_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, EngineError> {
        self.orders.get(order_id)?;

        let payload = signature::payment_payload(order_id, payment_id);
        let secret = &self.engine.config().gateway.key_secret;
        if !signature::verify(secret, payload.as_bytes(), signature_hex) {
            warn!(%order_id, "payment verification signature mismatch");
            return Err(EngineError::InvalidSignature);
        }

        self.settle_capture(order_id, payment_id, now)
    }

    /// Handle a raw webhook delivery
    ///
    /// The signature is verified over the exact raw body bytes before any
    /// parsing. Unknown event types verify and parse fine but have no
    /// effect.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` on a signature mismatch
    /// - `ParseError` when the body or the expected entity is malformed
    pub fn handle_webhook(
        &self,
        body: &[u8],
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, EngineError> {
        let secret = &self.engine.config().gateway.webhook_secret;
        if !signature::verify(secret, body, signature_hex) {
            warn!("webhook signature mismatch");
            return Err(EngineError::InvalidSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body).map_err(|e| {
            EngineError::ParseError {
                line: None,
                message: e.to_string(),
            }
        })?;

        match envelope.event.as_str() {
            "payment.captured" => {
                let payment: PaymentEntity = entity(&envelope.payload, "payment")?;
                let outcome = self.settle_capture(&payment.order_id, &payment.id, now)?;
                if outcome.credited {
                    Ok(WebhookOutcome::Credited(outcome.order))
                } else {
                    Ok(WebhookOutcome::AlreadyProcessed)
                }
            }
            "payment.failed" => {
                let payment: PaymentEntity = entity(&envelope.payload, "payment")?;
                self.orders.record_failure(
                    &payment.order_id,
                    FailureDetail {
                        code: payment.error_code,
                        description: payment.error_description,
                        source: payment.error_source,
                        step: payment.error_step,
                        reason: payment.error_reason,
                    },
                )?;
                Ok(WebhookOutcome::FailureRecorded)
            }
            "refund.processed" => {
                let payment: PaymentEntity = entity(&envelope.payload, "payment")?;
                let refund: RefundEntity = entity(&envelope.payload, "refund")?;
                self.orders.record_refund(
                    &payment.order_id,
                    RefundDetail {
                        // Refund amounts arrive in paise.
                        amount: refund.amount / Decimal::from(100),
                        reason: "gateway refund".to_string(),
                        gateway_refund_id: Some(refund.id),
                        processed_at: now,
                    },
                )?;
                Ok(WebhookOutcome::RefundRecorded)
            }
            "subscription.charged" => {
                let payment: PaymentEntity = entity(&envelope.payload, "payment")?;
                self.orders
                    .mark_paid_if_unpaid(&payment.order_id, &payment.id, now)?;
                info!(order_id = %payment.order_id, "subscription charge recorded");
                Ok(WebhookOutcome::SubscriptionRecorded)
            }
            other => {
                debug!(event = other, "ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Shared tail of both success paths: CAS, then credit the winner
    fn settle_capture(
        &self,
        order_id: &str,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, EngineError> {
        match self.orders.mark_paid_if_unpaid(order_id, payment_id, now)? {
            PaidOutcome::Captured(order) => {
                match self.engine.purchase_credits(&order, now) {
                    Ok(_) => Ok(VerifyOutcome {
                        order,
                        credited: true,
                    }),
                    // The ledger already holds this order's entry, so the
                    // credits exist; report a replay, not a failure.
                    Err(EngineError::AlreadyProcessed { .. }) => Ok(VerifyOutcome {
                        order,
                        credited: false,
                    }),
                    Err(e) => Err(e),
                }
            }
            PaidOutcome::AlreadyPaid(order) => Ok(VerifyOutcome {
                order,
                credited: false,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_source: Option<String>,
    #[serde(default)]
    error_step: Option<String>,
    #[serde(default)]
    error_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
    amount: Decimal,
}

/// Pull `payload.{kind}.entity` out of a webhook payload
fn entity<T: DeserializeOwned>(payload: &Value, kind: &str) -> Result<T, EngineError> {
    let value = payload
        .get(kind)
        .and_then(|wrapper| wrapper.get("entity"))
        .cloned()
        .ok_or_else(|| EngineError::ParseError {
            line: None,
            message: format!("webhook payload missing {}.entity", kind),
        })?;
    serde_json::from_value(value).map_err(|e| EngineError::ParseError {
        line: None,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::notify::NullSink;
    use crate::payment::gateway::SandboxGateway;
    use crate::store::{LeadStore, LedgerStore, UserDirectory};
    use crate::types::lead::TeachingMode;
    use crate::types::user::{Role, TutorMetrics, TutorProfile, UserRecord};
    use serde_json::json;

    const KEY_SECRET: &str = "test_key_secret";
    const WEBHOOK_SECRET: &str = "test_webhook_secret";

    fn service() -> PaymentService {
        let mut config = EngineConfig::default();
        config.gateway.key_secret = KEY_SECRET.to_string();
        config.gateway.webhook_secret = WEBHOOK_SECRET.to_string();

        let engine = Arc::new(CreditEngine::new(
            config,
            Arc::new(UserDirectory::new()),
            Arc::new(LedgerStore::new()),
            Arc::new(LeadStore::new()),
            Arc::new(NullSink),
        ));
        engine.register_user(UserRecord {
            id: 7,
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: String::new(),
            role: Role::Tutor(TutorProfile {
                city: "Mumbai".to_string(),
                subjects: vec!["Mathematics".to_string()],
                teaching_modes: vec![TeachingMode::Online],
                hourly_rate: None,
                approved: true,
                active: true,
                featured: false,
                rating_average: Decimal::ZERO,
                profile_completion: 0,
                metrics: TutorMetrics::default(),
            }),
        });

        PaymentService::new(engine, Arc::new(OrderStore::new()), Arc::new(SandboxGateway))
    }

    async fn created_order(service: &PaymentService) -> PaymentOrder {
        service
            .create_credit_order(7, "starter", Utc::now())
            .await
            .unwrap()
    }

    fn captured_body(order: &PaymentOrder) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_wh", "order_id": order.order_id }
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_order_prices_package_with_tax() {
        let service = service();
        let order = created_order(&service).await;

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.credits_purchased, 50);
        // 500 base + 90 tax.
        assert_eq!(order.amount, Decimal::from(590));
        assert_eq!(order.tax.total, Decimal::from(90));
        assert_eq!(order.tax.cgst, Decimal::from(45));
        assert_eq!(service.orders().get(&order.order_id).unwrap(), order);
    }

    #[tokio::test]
    async fn test_create_order_unknown_package() {
        let service = service();
        let err = service
            .create_credit_order(7, "mega", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::invalid_package("mega"));
    }

    #[tokio::test]
    async fn test_verify_credits_exactly_once() {
        let service = service();
        let order = created_order(&service).await;
        let now = Utc::now();
        let sig = signature::sign(
            KEY_SECRET,
            signature::payment_payload(&order.order_id, "pay_1").as_bytes(),
        );

        let first = service
            .verify_and_process_payment(&order.order_id, "pay_1", &sig, now)
            .unwrap();
        assert!(first.credited);
        assert_eq!(first.order.status, OrderStatus::Paid);
        assert_eq!(service.engine.balance(7).unwrap(), 50);

        let second = service
            .verify_and_process_payment(&order.order_id, "pay_1", &sig, now)
            .unwrap();
        assert!(!second.credited);
        assert_eq!(service.engine.balance(7).unwrap(), 50);
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_signature() {
        let service = service();
        let order = created_order(&service).await;

        let err = service
            .verify_and_process_payment(&order.order_id, "pay_1", "deadbeef", Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidSignature);
        assert_eq!(service.engine.balance(7).unwrap(), 0);
        assert_eq!(
            service.orders().get(&order.order_id).unwrap().status,
            OrderStatus::Created
        );
    }

    #[tokio::test]
    async fn test_webhook_credits_when_verify_never_arrives() {
        let service = service();
        let order = created_order(&service).await;
        let body = captured_body(&order);
        let sig = signature::sign(WEBHOOK_SECRET, &body);

        let outcome = service.handle_webhook(&body, &sig, Utc::now()).unwrap();
        assert!(matches!(outcome, WebhookOutcome::Credited(_)));
        assert_eq!(service.engine.balance(7).unwrap(), 50);

        // A later client verify is a harmless replay.
        let verify_sig = signature::sign(
            KEY_SECRET,
            signature::payment_payload(&order.order_id, "pay_wh").as_bytes(),
        );
        let verify = service
            .verify_and_process_payment(&order.order_id, "pay_wh", &verify_sig, Utc::now())
            .unwrap();
        assert!(!verify.credited);
        assert_eq!(service.engine.balance(7).unwrap(), 50);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let service = service();
        let order = created_order(&service).await;
        let body = captured_body(&order);

        let err = service
            .handle_webhook(&body, "deadbeef", Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidSignature);
        assert_eq!(service.engine.balance(7).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_webhook_records_failure() {
        let service = service();
        let order = created_order(&service).await;
        let body = serde_json::to_vec(&json!({
            "event": "payment.failed",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_1",
                        "order_id": order.order_id,
                        "error_code": "BAD_REQUEST_ERROR",
                        "error_description": "card declined"
                    }
                }
            }
        }))
        .unwrap();
        let sig = signature::sign(WEBHOOK_SECRET, &body);

        let outcome = service.handle_webhook(&body, &sig, Utc::now()).unwrap();
        assert_eq!(outcome, WebhookOutcome::FailureRecorded);

        let stored = service.orders().get(&order.order_id).unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(
            stored.failure.unwrap().code.as_deref(),
            Some("BAD_REQUEST_ERROR")
        );
    }

    #[tokio::test]
    async fn test_webhook_records_refund_on_paid_order() {
        let service = service();
        let order = created_order(&service).await;
        let captured = captured_body(&order);
        let sig = signature::sign(WEBHOOK_SECRET, &captured);
        service.handle_webhook(&captured, &sig, Utc::now()).unwrap();

        let body = serde_json::to_vec(&json!({
            "event": "refund.processed",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_wh", "order_id": order.order_id }
                },
                "refund": {
                    "entity": { "id": "rfnd_1", "amount": "59000" }
                }
            }
        }))
        .unwrap();
        let sig = signature::sign(WEBHOOK_SECRET, &body);

        let outcome = service.handle_webhook(&body, &sig, Utc::now()).unwrap();
        assert_eq!(outcome, WebhookOutcome::RefundRecorded);
        assert_eq!(
            service.orders().get(&order.order_id).unwrap().status,
            OrderStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_webhook_marks_subscription_order_paid() {
        let service = service();
        let mut order = created_order(&service).await;
        order.purpose = PaymentPurpose::Subscription;
        order.credits_purchased = 0;
        service.orders().insert(order.clone());

        let body = serde_json::to_vec(&json!({
            "event": "subscription.charged",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_sub", "order_id": order.order_id }
                }
            }
        }))
        .unwrap();
        let sig = signature::sign(WEBHOOK_SECRET, &body);

        let outcome = service.handle_webhook(&body, &sig, Utc::now()).unwrap();
        assert_eq!(outcome, WebhookOutcome::SubscriptionRecorded);
        assert_eq!(
            service.orders().get(&order.order_id).unwrap().status,
            OrderStatus::Paid
        );
        // Subscription charges never grant credits.
        assert_eq!(service.engine.balance(7).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_webhook_ignores_unknown_event() {
        let service = service();
        let body = serde_json::to_vec(&json!({
            "event": "invoice.generated",
            "payload": {}
        }))
        .unwrap();
        let sig = signature::sign(WEBHOOK_SECRET, &body);

        let outcome = service.handle_webhook(&body, &sig, Utc::now()).unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }
}
