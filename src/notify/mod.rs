//! Notification events and delivery sinks
//!
//! The engine emits events after state changes commit; delivery is strictly
//! best effort and never affects the outcome of the operation that produced
//! the event. A failed publish is logged and dropped.

use crate::types::lead::LeadId;
use crate::types::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tracing::info;

/// Events published by the engine after a state change commits
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A tutor unlocked a lead and now holds its contact lock
    LeadLocked {
        lead: LeadId,
        lead_ref: String,
        tutor: UserId,
        expires_at: DateTime<Utc>,
    },
    /// A lead's contact lock lapsed and the lead returned to the pool
    LeadLockExpired {
        lead: LeadId,
        lead_ref: String,
        tutor: UserId,
    },
    /// A tutor's balance dropped below the configured threshold
    LowBalance { tutor: UserId, balance: i64 },
    /// A payment was captured and credits were granted
    PaymentConfirmed {
        tutor: UserId,
        order_id: String,
        credits: u32,
        amount: Decimal,
    },
}

/// Error raised by a sink that failed to deliver an event
#[derive(Debug, Clone, PartialEq)]
pub struct SinkError {
    pub message: String,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification sink error: {}", self.message)
    }
}

impl std::error::Error for SinkError {}

/// Destination for engine events
pub trait NotificationSink: Send + Sync {
    /// Deliver a single event
    fn publish(&self, event: &Event) -> Result<(), SinkError>;
}

/// Sink that writes events to the structured log
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, event: &Event) -> Result<(), SinkError> {
        match event {
            Event::LeadLocked {
                lead,
                lead_ref,
                tutor,
                expires_at,
            } => {
                info!(lead, %lead_ref, tutor, %expires_at, "lead locked");
            }
            Event::LeadLockExpired {
                lead,
                lead_ref,
                tutor,
            } => {
                info!(lead, %lead_ref, tutor, "lead lock expired");
            }
            Event::LowBalance { tutor, balance } => {
                info!(tutor, balance, "low credit balance");
            }
            Event::PaymentConfirmed {
                tutor,
                order_id,
                credits,
                amount,
            } => {
                info!(tutor, %order_id, credits, %amount, "payment confirmed");
            }
        }
        Ok(())
    }
}

/// Sink that discards everything, for tests and replay runs
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: &Event) -> Result<(), SinkError> {
        Ok(())
    }
}
