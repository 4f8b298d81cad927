//! The credit engine
//!
//! `CreditEngine` coordinates the stores to run the operations that span
//! more than one of them. The only genuinely multi-store write is the
//! unlock, which must either fully succeed (lead locked, credits deducted,
//! both recorded) or leave no trace. Without cross-store transactions the
//! engine sequences it as a saga:
//!
//! 1. preconditions (approval, prior unlock, balance) with no side effects
//! 2. lead compare-and-swap `active → locked`, the contention point that
//!    picks exactly one winner among racing tutors
//! 3. ledger debit; on failure the lead lock from step 2 is released
//!
//! A tutor is therefore never charged without holding the lock, and a lead
//! is never left locked by a tutor who was not charged. Metric updates and
//! notifications run after the state change commits and are best effort:
//! their failure is logged, never propagated.

use crate::config::EngineConfig;
use crate::notify::{Event, NotificationSink};
use crate::store::{LeadStore, LedgerStore, Pagination, UserDirectory};
use crate::types::account::CreditAccount;
use crate::types::lead::{Lead, LeadId, LeadStatus};
use crate::types::payment::PaymentOrder;
use crate::types::transaction::{
    generate_txn_id, CreditTransaction, TransactionDraft, TransactionType,
};
use crate::types::user::{Role, UserId, UserRecord};
use crate::types::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Everything a successful unlock returns to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockReceipt {
    /// The lead, now locked, with student contact details revealed
    pub lead: Lead,
    /// The ledger entry recording the deduction
    pub transaction: CreditTransaction,
    /// Balance left after the deduction
    pub remaining_credits: i64,
}

/// Orchestrating engine over the stores
pub struct CreditEngine {
    config: EngineConfig,
    directory: Arc<UserDirectory>,
    ledger: Arc<LedgerStore>,
    leads: Arc<LeadStore>,
    sink: Arc<dyn NotificationSink>,
}

impl CreditEngine {
    /// Create an engine over shared stores
    pub fn new(
        config: EngineConfig,
        directory: Arc<UserDirectory>,
        ledger: Arc<LedgerStore>,
        leads: Arc<LeadStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        CreditEngine {
            config,
            directory,
            ledger,
            leads,
            sink,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared lead store
    pub fn leads(&self) -> &Arc<LeadStore> {
        &self.leads
    }

    /// The shared ledger store
    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    /// The shared user directory
    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    /// Register a user; tutors also get a zero-balance credit account
    pub fn register_user(&self, user: UserRecord) {
        let is_tutor = matches!(user.role, Role::Tutor(_));
        let id = user.id;
        self.directory.register(user);
        if is_tutor {
            self.ledger.open_account(id);
        }
    }

    /// Current credit balance for a tutor
    pub fn balance(&self, tutor: UserId) -> Result<i64, EngineError> {
        self.ledger.balance(tutor)
    }

    /// Account snapshot for a tutor
    pub fn account(&self, tutor: UserId) -> Result<CreditAccount, EngineError> {
        self.ledger.account(tutor)
    }

    /// Full transaction history for a tutor
    pub fn history(&self, tutor: UserId) -> Vec<CreditTransaction> {
        self.ledger.history(tutor)
    }

    /// Active leads matching a tutor's profile
    ///
    /// A pure query: repeating it returns the same leads until one is
    /// unlocked, explicitly marked notified, or leaves the pool.
    pub fn matches_for(
        &self,
        tutor: UserId,
        page: Pagination,
    ) -> Result<Vec<Lead>, EngineError> {
        let profile = self.directory.tutor_profile(tutor)?;
        if !profile.approved {
            return Err(EngineError::not_approved(tutor));
        }
        Ok(self.leads.find_active_matches(tutor, &profile, page))
    }

    /// Record that a tutor was notified about a matched lead
    ///
    /// Notified leads stop appearing in the tutor's match queries and
    /// count toward the tutor's `total_leads`.
    pub fn mark_lead_notified(&self, tutor: UserId, lead: LeadId) -> Result<(), EngineError> {
        self.leads.mark_matched(lead, tutor)?;
        self.bump_metrics(tutor, |metrics| metrics.total_leads += 1);
        Ok(())
    }

    /// Unlock a lead: take the exclusive lock and deduct the unlock cost
    ///
    /// Atomic as seen by the caller: either the lead is locked for this
    /// tutor and the deduction is on the ledger, or neither happened. Of
    /// two tutors racing for the same lead exactly one wins; the loser gets
    /// `LeadUnavailable` and is not charged.
    ///
    /// # Errors
    ///
    /// - `TutorNotFound` / `NotApproved` on identity preconditions
    /// - `AlreadyUnlocked` if this tutor already unlocked this lead
    /// - `InsufficientBalance` if the balance is below the unlock cost
    /// - `LeadNotFound` / `LeadUnavailable` from the lead store
    pub fn unlock_lead(
        &self,
        tutor: UserId,
        lead: LeadId,
        now: DateTime<Utc>,
    ) -> Result<UnlockReceipt, EngineError> {
        let profile = self.directory.tutor_profile(tutor)?;
        if !profile.approved || !profile.active {
            return Err(EngineError::not_approved(tutor));
        }
        if self.ledger.has_unlocked(tutor, lead) {
            return Err(EngineError::already_unlocked(tutor, lead));
        }

        let cost = self.config.unlock_cost;
        let balance = self.ledger.balance(tutor)?;
        if balance < cost {
            return Err(EngineError::insufficient_balance(tutor, cost, balance));
        }

        // The CAS that decides concurrent unlock races.
        let locked = self
            .leads
            .transition_lock(lead, tutor, cost, now, self.config.lock_duration())?;

        let draft = TransactionDraft::unlock(lead, &locked.lead_ref, cost);
        let entry = match self.ledger.apply(tutor, draft, now) {
            Ok(entry) => entry,
            Err(e) => {
                // Compensate: the tutor was not charged, so the lock must
                // not stand.
                if let Err(release_err) = self.leads.transition_release(lead) {
                    error!(
                        tutor,
                        lead,
                        error = %release_err,
                        "failed to release lock after debit failure"
                    );
                }
                return Err(e);
            }
        };

        self.bump_metrics(tutor, |metrics| {
            metrics.unlocked_leads += 1;
            if metrics.unlocked_leads > 0 {
                metrics.conversion_rate = Decimal::from(metrics.converted_leads)
                    * Decimal::from(100)
                    / Decimal::from(metrics.unlocked_leads);
            }
        });

        self.publish(Event::LeadLocked {
            lead: locked.id,
            lead_ref: locked.lead_ref.clone(),
            tutor,
            expires_at: locked.lock.expires_at.unwrap_or(now),
        });
        if entry.balance_after < self.config.low_balance_threshold {
            self.publish(Event::LowBalance {
                tutor,
                balance: entry.balance_after,
            });
        }

        debug!(tutor, lead, balance = entry.balance_after, "lead unlocked");
        Ok(UnlockReceipt {
            lead: locked,
            remaining_credits: entry.balance_after,
            transaction: entry,
        })
    }

    /// Release a lapsed lock back to the pool
    ///
    /// No credits come back: the tutor had the exclusivity window they paid
    /// for. The release preserves the lead's cumulative `unlock_count`,
    /// writes a zero-amount `expiry` marker to the former holder's ledger
    /// for audit, and notifies the holder.
    pub fn unlock_expiry(&self, lead: LeadId, now: DateTime<Utc>) -> Result<Lead, EngineError> {
        let snapshot = self.leads.get(lead)?;
        let tutor = snapshot.lock.tutor.ok_or_else(|| {
            EngineError::invalid_state(lead, "release", LeadStatus::Locked, snapshot.status)
        })?;

        // Release only while the observed holder still holds the lock; a
        // lock re-taken by another tutor since the scan is left alone.
        let released = self.leads.transition_release_if_held(lead, tutor)?;

        let marker = TransactionDraft {
            id: generate_txn_id(),
            tx_type: TransactionType::Expiry,
            amount: 0,
            description: format!("Lock expired on lead {}", released.lead_ref),
            related_lead: Some(released.id),
            related_order: None,
        };
        if let Err(e) = self.ledger.apply(tutor, marker, now) {
            warn!(tutor, lead, error = %e, "expiry marker failed");
        }
        self.publish(Event::LeadLockExpired {
            lead: released.id,
            lead_ref: released.lead_ref.clone(),
            tutor,
        });
        Ok(released)
    }

    /// Refund the credits a tutor spent unlocking a lead
    ///
    /// Admin-gated and once per (tutor, lead): the exact amount of the
    /// original unlock entry is credited back and the lead is marked
    /// refunded. The lock need not still be live; a lead whose lock lapsed
    /// and was released by the sweeper is still refundable. A lead
    /// currently locked by a different tutor is not: that tutor's lock
    /// stands.
    ///
    /// # Errors
    ///
    /// - `AlreadyRefunded` on a repeat refund
    /// - `NoUnlockFound` if the tutor never unlocked this lead, or a
    ///   different tutor now holds the lock
    /// - `InvalidState` if the lead left the pool (converted, expired,
    ///   cancelled)
    pub fn refund_credits(
        &self,
        tutor: UserId,
        lead: LeadId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, EngineError> {
        if self.ledger.has_refunded(tutor, lead) {
            return Err(EngineError::already_refunded(tutor, lead));
        }
        let unlock = self
            .ledger
            .find_unlock(tutor, lead)
            .ok_or_else(|| EngineError::no_unlock_found(tutor, lead))?;

        // CAS (locked | active) → refunded under the entry lock: it
        // rejects a lead held by another tutor and serializes concurrent
        // refund attempts, so only one caller reaches the credit below.
        let (prior, _) = self.leads.mark_refunded(lead, tutor, reason)?;

        let amount = -unlock.amount;
        let entry = match self
            .ledger
            .apply(tutor, TransactionDraft::refund(lead, amount, reason), now)
        {
            Ok(entry) => entry,
            Err(e) => {
                // Compensate: no credits came back, so the refund mark
                // must not stand.
                if let Err(restore_err) = self.leads.unmark_refunded(lead, prior) {
                    error!(
                        tutor,
                        lead,
                        error = %restore_err,
                        "failed to restore lead after refund credit failure"
                    );
                }
                return Err(e);
            }
        };

        debug!(tutor, lead, amount, "unlock refunded");
        Ok(entry)
    }

    /// Grant promotional or compensatory credits
    pub fn add_bonus_credits(
        &self,
        tutor: UserId,
        amount: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, EngineError> {
        if amount <= 0 {
            return Err(EngineError::invalid_amount(amount, "bonus must be positive"));
        }
        self.ledger
            .apply(tutor, TransactionDraft::bonus(amount, reason), now)
    }

    /// Manually adjust a tutor's balance (admin operation)
    ///
    /// Negative adjustments are bounded by the balance; the ledger rejects
    /// an overdraw.
    pub fn adjust_credits(
        &self,
        tutor: UserId,
        amount: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, EngineError> {
        if amount == 0 {
            return Err(EngineError::invalid_amount(amount, "adjustment of zero"));
        }
        self.ledger
            .apply(tutor, TransactionDraft::adjustment(amount, reason), now)
    }

    /// Grant the credits a captured payment order paid for
    ///
    /// Idempotent per order: the ledger entry id is derived from the order
    /// id, so a replay collides and surfaces as `AlreadyProcessed`.
    pub fn purchase_credits(
        &self,
        order: &PaymentOrder,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, EngineError> {
        let draft = TransactionDraft::purchase(
            &order.order_id,
            order.payment_id.as_deref(),
            order.credits_purchased,
            order.amount,
        );
        let entry = self
            .ledger
            .apply(order.user, draft, now)
            .map_err(|e| match e {
                EngineError::DuplicateTransaction { .. } => {
                    EngineError::already_processed(&order.order_id)
                }
                other => other,
            })?;

        self.publish(Event::PaymentConfirmed {
            tutor: order.user,
            order_id: order.order_id.clone(),
            credits: order.credits_purchased as u32,
            amount: order.amount,
        });
        Ok(entry)
    }

    /// Record that the lock-holding tutor converted a lead
    pub fn convert_lead(
        &self,
        tutor: UserId,
        lead: LeadId,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<Lead, EngineError> {
        let converted = self.leads.transition_convert(lead, tutor, notes, now)?;

        self.bump_metrics(tutor, |metrics| {
            metrics.converted_leads += 1;
            if metrics.unlocked_leads > 0 {
                metrics.conversion_rate = Decimal::from(metrics.converted_leads)
                    * Decimal::from(100)
                    / Decimal::from(metrics.unlocked_leads);
            }
        });
        Ok(converted)
    }

    /// Deliver an event, logging and swallowing sink failures
    pub(crate) fn publish(&self, event: Event) {
        if let Err(e) = self.sink.publish(&event) {
            warn!(error = %e, "notification publish failed");
        }
    }

    fn bump_metrics<F>(&self, tutor: UserId, f: F)
    where
        F: FnOnce(&mut crate::types::user::TutorMetrics),
    {
        if let Err(e) = self.directory.update_tutor(tutor, |profile| f(&mut profile.metrics)) {
            warn!(tutor, error = %e, "metrics update failed");
        }
    }
}
