//! Payment gateway client abstraction
//!
//! The engine only needs one call from the gateway: create an order and get
//! back its gateway-assigned id. Everything after that arrives as signed
//! notifications handled by the reconciliation service. The trait keeps the
//! network client swappable; `SandboxGateway` is the in-process stand-in
//! used by tests and the replay binary.

use crate::types::EngineError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

/// An order as the gateway reports it after creation
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    /// Gateway-assigned order identifier
    pub id: String,
    /// Amount the gateway will collect, in paise (minor units)
    pub amount: Decimal,
    /// Currency code
    pub currency: String,
}

/// Client for the external payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an order with the gateway
    ///
    /// # Errors
    ///
    /// `ExternalServiceError` when the gateway rejects the request or is
    /// unreachable; `retryable` distinguishes transient failures.
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, EngineError>;
}

/// In-process gateway that fabricates order ids locally
#[derive(Debug, Default)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        _receipt: &str,
    ) -> Result<GatewayOrder, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::external("amount must be positive", false));
        }
        let raw = Uuid::new_v4().simple().to_string();
        Ok(GatewayOrder {
            id: format!("order_{}", &raw[..14]),
            amount,
            currency: currency.to_string(),
        })
    }
}
