//! Tutor credit account type
//!
//! One account per tutor, owned exclusively by the ledger store: nothing
//! outside the ledger mutates balances. `total_purchased` and `total_spent`
//! are monotonic non-decreasing counters; `balance` never goes negative.

use super::error::EngineError;
use super::user::UserId;
use serde::{Deserialize, Serialize};

/// Tutor credit account state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    /// Owning tutor
    pub tutor: UserId,
    /// Credits currently available
    pub balance: i64,
    /// Lifetime credits added (purchases, bonuses, refunds)
    pub total_purchased: i64,
    /// Lifetime credits spent on unlocks
    pub total_spent: i64,
}

impl CreditAccount {
    /// Create a new account with zero balance
    pub fn new(tutor: UserId) -> Self {
        CreditAccount {
            tutor,
            balance: 0,
            total_purchased: 0,
            total_spent: 0,
        }
    }

    /// Add credits to the account
    pub fn credit(&mut self, amount: i64) {
        self.balance += amount;
        self.total_purchased += amount;
    }

    /// Deduct credits from the account
    ///
    /// Fails with `InsufficientBalance` if the deduction would take the
    /// balance negative; the account is left unchanged in that case.
    pub fn debit(&mut self, amount: i64) -> Result<(), EngineError> {
        if self.balance < amount {
            return Err(EngineError::insufficient_balance(
                self.tutor,
                amount,
                self.balance,
            ));
        }

        self.balance -= amount;
        self.total_spent += amount;
        Ok(())
    }
}
