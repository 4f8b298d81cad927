//! Payment gateway integration and reconciliation
//!
//! Split into three pieces: HMAC signature primitives, the gateway client
//! abstraction, and the reconciliation service that turns gateway
//! notifications into credit grants exactly once per order.

pub mod gateway;
pub mod reconciliation;
pub mod signature;

pub use gateway::{GatewayOrder, PaymentGateway, SandboxGateway};
pub use reconciliation::{PaymentService, VerifyOutcome, WebhookOutcome};
