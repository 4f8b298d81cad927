//! CSV format handling for replay operations and balance output
//!
//! Centralizes the CSV concerns of the replay binary: the raw record
//! shape, conversion into validated domain operations, and the balances
//! output. Conversion is pure (no I/O) for easy testing.
//!
//! Input columns: `op,tutor,lead,amount,order`. Which trailing columns are
//! required depends on the operation; `convert_csv_record` validates that.

use crate::types::account::CreditAccount;
use crate::types::lead::LeadId;
use crate::types::user::UserId;
use crate::types::EngineError;
use serde::Deserialize;
use std::io::Write;

/// Raw CSV record as deserialized
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CsvRecord {
    /// Operation name
    pub op: String,
    /// Acting tutor
    pub tutor: UserId,
    /// Target lead, for lead operations
    pub lead: Option<LeadId>,
    /// Credit amount, for balance operations
    pub amount: Option<i64>,
    /// Order id, for purchases
    pub order: Option<String>,
}

/// Replay operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Grant bonus credits (`amount`)
    Bonus,
    /// Manual adjustment, positive or negative (`amount`)
    Adjust,
    /// Grant purchased credits (`amount`, `order`)
    Purchase,
    /// Unlock a lead (`lead`)
    Unlock,
    /// Refund an unlock (`lead`)
    Refund,
    /// Convert a locked lead (`lead`)
    Convert,
}

/// A validated replay operation
#[derive(Debug, Clone, PartialEq)]
pub struct OpRecord {
    /// What to do
    pub kind: OpKind,
    /// Acting tutor
    pub tutor: UserId,
    /// Target lead, present iff the kind needs one
    pub lead: Option<LeadId>,
    /// Credit amount, present iff the kind needs one
    pub amount: Option<i64>,
    /// Order id, present iff the kind is a purchase
    pub order: Option<String>,
}

/// Convert a raw CSV record into a validated operation
pub fn convert_csv_record(record: CsvRecord) -> Result<OpRecord, EngineError> {
    let kind = match record.op.to_lowercase().as_str() {
        "bonus" => OpKind::Bonus,
        "adjust" => OpKind::Adjust,
        "purchase" => OpKind::Purchase,
        "unlock" => OpKind::Unlock,
        "refund" => OpKind::Refund,
        "convert" => OpKind::Convert,
        other => {
            return Err(EngineError::ParseError {
                line: None,
                message: format!("unknown operation '{}'", other),
            })
        }
    };

    match kind {
        OpKind::Bonus | OpKind::Adjust if record.amount.is_none() => {
            return Err(EngineError::ParseError {
                line: None,
                message: format!("'{}' requires an amount", record.op),
            });
        }
        OpKind::Purchase if record.amount.is_none() || record.order.is_none() => {
            return Err(EngineError::ParseError {
                line: None,
                message: "'purchase' requires an amount and an order".to_string(),
            });
        }
        OpKind::Unlock | OpKind::Refund | OpKind::Convert if record.lead.is_none() => {
            return Err(EngineError::ParseError {
                line: None,
                message: format!("'{}' requires a lead", record.op),
            });
        }
        _ => {}
    }

    Ok(OpRecord {
        kind,
        tutor: record.tutor,
        lead: record.lead,
        amount: record.amount,
        order: record.order,
    })
}

/// Write the final balances as CSV
///
/// Columns: `tutor,balance,total_purchased,total_spent`, one row per
/// account in the order given.
pub fn write_balances_csv<W: Write>(
    accounts: &[CreditAccount],
    output: &mut W,
) -> Result<(), EngineError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["tutor", "balance", "total_purchased", "total_spent"])?;
    for account in accounts {
        writer.write_record([
            account.tutor.to_string(),
            account.balance.to_string(),
            account.total_purchased.to_string(),
            account.total_spent.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
