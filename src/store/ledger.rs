//! Ledger store: balances and the append-only transaction log
//!
//! The ledger is the durable source of truth for credits. It keeps, per
//! tutor, the live `CreditAccount` and an ordered log of immutable
//! `CreditTransaction` entries, plus two unique indexes that turn the
//! idempotency rules into storage-level constraints:
//!
//! - at most one `unlock` entry per (tutor, lead)
//! - at most one `refund` entry per (tutor, lead)
//! - globally unique transaction ids (purchases derive theirs from the
//!   order id, so an order can only ever be credited once)
//!
//! # Atomicity
//!
//! `apply` is the only mutation path. It holds the account's DashMap entry
//! lock for the whole check-mutate-append sequence, so concurrent
//! operations on the same tutor serialize and per-tutor log order matches
//! apply order (monotonic `balance_after`). All uniqueness checks happen
//! before any state changes; a rejected draft leaves the store untouched.

use crate::types::account::CreditAccount;
use crate::types::lead::LeadId;
use crate::types::transaction::{CreditTransaction, TransactionDraft, TransactionType};
use crate::types::user::UserId;
use crate::types::EngineError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Durable record of tutor balances and transaction history
#[derive(Debug, Default)]
pub struct LedgerStore {
    /// Live account state per tutor
    accounts: DashMap<UserId, CreditAccount>,
    /// Append-only transaction log per tutor, in apply order
    log: DashMap<UserId, Vec<CreditTransaction>>,
    /// Every transaction id ever appended, for duplicate rejection
    ids: DashMap<String, UserId>,
    /// Unique (tutor, lead, type) index for unlock and refund entries
    lead_index: DashMap<(UserId, LeadId, TransactionType), String>,
}

impl LedgerStore {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a zero-balance account for a tutor
    ///
    /// Idempotent: an existing account is left untouched.
    pub fn open_account(&self, tutor: UserId) {
        self.accounts
            .entry(tutor)
            .or_insert_with(|| CreditAccount::new(tutor));
    }

    /// Current balance for a tutor
    pub fn balance(&self, tutor: UserId) -> Result<i64, EngineError> {
        self.accounts
            .get(&tutor)
            .map(|account| account.balance)
            .ok_or_else(|| EngineError::tutor_not_found(tutor))
    }

    /// Snapshot of a tutor's account
    pub fn account(&self, tutor: UserId) -> Result<CreditAccount, EngineError> {
        self.accounts
            .get(&tutor)
            .map(|account| account.clone())
            .ok_or_else(|| EngineError::tutor_not_found(tutor))
    }

    /// Apply a draft: mutate the balance and append the ledger entry
    ///
    /// One atomic unit per tutor. Checks run in order — account exists,
    /// sufficient balance, unique transaction id, unique (tutor, lead,
    /// type) for unlock/refund drafts — and only then does the account
    /// mutate and the entry append. Any rejection leaves balance, log, and
    /// indexes exactly as they were.
    ///
    /// # Errors
    ///
    /// - `TutorNotFound` if no account is open for the tutor
    /// - `InsufficientBalance` if a negative draft would overdraw
    /// - `DuplicateTransaction` if the draft id was already appended
    /// - `AlreadyUnlocked` / `AlreadyRefunded` on a lead-index collision
    pub fn apply(
        &self,
        tutor: UserId,
        draft: TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<CreditTransaction, EngineError> {
        let mut account = self
            .accounts
            .get_mut(&tutor)
            .ok_or_else(|| EngineError::tutor_not_found(tutor))?;

        // Balance precheck has no side effects, so it runs first.
        if draft.amount < 0 && account.balance < -draft.amount {
            return Err(EngineError::insufficient_balance(
                tutor,
                -draft.amount,
                account.balance,
            ));
        }

        match self.ids.entry(draft.id.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::duplicate_transaction(&draft.id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(tutor);
            }
        }

        if let Err(e) = self.claim_lead_index(tutor, &draft) {
            // Undo the id reservation so a corrected retry can reuse it.
            self.ids.remove(&draft.id);
            return Err(e);
        }

        if draft.amount >= 0 {
            account.credit(draft.amount);
        } else if let Err(e) = account.debit(-draft.amount) {
            self.release_lead_index(tutor, &draft);
            self.ids.remove(&draft.id);
            return Err(e);
        }

        let entry = CreditTransaction {
            id: draft.id,
            tutor,
            tx_type: draft.tx_type,
            amount: draft.amount,
            balance_after: account.balance,
            description: draft.description,
            related_lead: draft.related_lead,
            related_order: draft.related_order,
            created_at: now,
        };

        self.log.entry(tutor).or_default().push(entry.clone());
        Ok(entry)
    }

    /// Reserve the unique (tutor, lead, type) slot for unlock/refund drafts
    fn claim_lead_index(
        &self,
        tutor: UserId,
        draft: &TransactionDraft,
    ) -> Result<(), EngineError> {
        let lead = match (draft.tx_type, draft.related_lead) {
            (TransactionType::Unlock, Some(lead)) | (TransactionType::Refund, Some(lead)) => lead,
            _ => return Ok(()),
        };

        match self.lead_index.entry((tutor, lead, draft.tx_type)) {
            Entry::Occupied(_) => Err(match draft.tx_type {
                TransactionType::Unlock => EngineError::already_unlocked(tutor, lead),
                _ => EngineError::already_refunded(tutor, lead),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(draft.id.clone());
                Ok(())
            }
        }
    }

    fn release_lead_index(&self, tutor: UserId, draft: &TransactionDraft) {
        if let Some(lead) = draft.related_lead {
            if matches!(
                draft.tx_type,
                TransactionType::Unlock | TransactionType::Refund
            ) {
                self.lead_index.remove(&(tutor, lead, draft.tx_type));
            }
        }
    }

    /// Transaction history for a tutor, in apply order
    pub fn history(&self, tutor: UserId) -> Vec<CreditTransaction> {
        self.log
            .get(&tutor)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Whether the tutor already has an unlock entry for this lead
    pub fn has_unlocked(&self, tutor: UserId, lead: LeadId) -> bool {
        self.lead_index
            .contains_key(&(tutor, lead, TransactionType::Unlock))
    }

    /// Whether the tutor already has a refund entry for this lead
    pub fn has_refunded(&self, tutor: UserId, lead: LeadId) -> bool {
        self.lead_index
            .contains_key(&(tutor, lead, TransactionType::Refund))
    }

    /// Find the original unlock entry for a (tutor, lead) pair
    ///
    /// Used by the refund path to recover the exact amount to credit back.
    pub fn find_unlock(&self, tutor: UserId, lead: LeadId) -> Option<CreditTransaction> {
        let id = self
            .lead_index
            .get(&(tutor, lead, TransactionType::Unlock))?
            .clone();
        self.log
            .get(&tutor)?
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// Replay a tutor's log from zero
    ///
    /// Audit helper: the returned sum must equal the live balance, and each
    /// entry's `balance_after` must equal the running sum at that point.
    pub fn replay_balance(&self, tutor: UserId) -> Result<i64, EngineError> {
        // Touch the account first so an unknown tutor errors, not sums to 0.
        self.balance(tutor)?;

        let mut running = 0;
        for entry in self.history(tutor) {
            running += entry.amount;
            debug_assert_eq!(entry.balance_after, running);
        }
        Ok(running)
    }

    /// All open accounts, sorted by tutor id
    ///
    /// Deterministic ordering for replay output and balance scans.
    pub fn all_accounts(&self) -> Vec<CreditAccount> {
        let mut accounts: Vec<CreditAccount> =
            self.accounts.iter().map(|entry| entry.clone()).collect();
        accounts.sort_by_key(|account| account.tutor);
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_balance(tutor: UserId, balance: i64) -> LedgerStore {
        let ledger = LedgerStore::new();
        ledger.open_account(tutor);
        if balance > 0 {
            ledger
                .apply(tutor, TransactionDraft::bonus(balance, "seed"), Utc::now())
                .unwrap();
        }
        ledger
    }

    #[test]
    fn test_unknown_tutor_is_not_found() {
        let ledger = LedgerStore::new();
        assert_eq!(
            ledger.balance(9).unwrap_err(),
            EngineError::tutor_not_found(9)
        );
        let err = ledger
            .apply(9, TransactionDraft::bonus(5, "x"), Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::tutor_not_found(9));
    }

    #[test]
    fn test_apply_records_balance_after() {
        let ledger = ledger_with_balance(7, 15);

        let entry = ledger
            .apply(7, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap();
        assert_eq!(entry.amount, -10);
        assert_eq!(entry.balance_after, 5);
        assert_eq!(ledger.balance(7).unwrap(), 5);

        let account = ledger.account(7).unwrap();
        assert_eq!(account.total_purchased, 15);
        assert_eq!(account.total_spent, 10);
    }

    #[test]
    fn test_overdraft_rejected_without_side_effects() {
        let ledger = ledger_with_balance(7, 5);
        let before = ledger.history(7).len();

        let err = ledger
            .apply(7, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::insufficient_balance(7, 10, 5));
        assert_eq!(ledger.balance(7).unwrap(), 5);
        assert_eq!(ledger.history(7).len(), before);
        // The unlock slot must still be free for a funded retry.
        assert!(!ledger.has_unlocked(7, 1));
    }

    #[test]
    fn test_duplicate_transaction_id_rejected() {
        let ledger = ledger_with_balance(7, 100);

        let draft = TransactionDraft::purchase("ORD1", None, 50, 590.into());
        ledger.apply(7, draft.clone(), Utc::now()).unwrap();

        let err = ledger.apply(7, draft, Utc::now()).unwrap_err();
        assert_eq!(err, EngineError::duplicate_transaction("TXN-PUR-ORD1"));
        assert_eq!(ledger.balance(7).unwrap(), 150);
    }

    #[test]
    fn test_unlock_index_is_unique_per_tutor_lead() {
        let ledger = ledger_with_balance(7, 100);

        ledger
            .apply(7, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap();
        assert!(ledger.has_unlocked(7, 1));

        // Distinct draft id, same (tutor, lead, unlock) slot.
        let err = ledger
            .apply(7, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::already_unlocked(7, 1));
        assert_eq!(ledger.balance(7).unwrap(), 90);

        // A different tutor unlocking the same lead is unaffected.
        ledger.open_account(8);
        ledger
            .apply(8, TransactionDraft::bonus(20, "seed"), Utc::now())
            .unwrap();
        ledger
            .apply(8, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap();
    }

    #[test]
    fn test_refund_index_is_unique() {
        let ledger = ledger_with_balance(7, 20);
        ledger
            .apply(7, TransactionDraft::unlock(1, "TB-X", 10), Utc::now())
            .unwrap();
        ledger
            .apply(7, TransactionDraft::refund(1, 10, "fake lead"), Utc::now())
            .unwrap();

        let err = ledger
            .apply(7, TransactionDraft::refund(1, 10, "fake lead"), Utc::now())
            .unwrap_err();
        assert_eq!(err, EngineError::already_refunded(7, 1));
        assert_eq!(ledger.balance(7).unwrap(), 20);
    }

    #[test]
    fn test_find_unlock_returns_original_entry() {
        let ledger = ledger_with_balance(7, 50);
        let entry = ledger
            .apply(7, TransactionDraft::unlock(3, "TB-Y", 10), Utc::now())
            .unwrap();

        let found = ledger.find_unlock(7, 3).unwrap();
        assert_eq!(found.id, entry.id);
        assert_eq!(found.amount, -10);
        assert!(ledger.find_unlock(7, 99).is_none());
    }

    #[test]
    fn test_replay_reproduces_balance() {
        let ledger = ledger_with_balance(7, 0);
        ledger.open_account(7);
        ledger
            .apply(7, TransactionDraft::bonus(30, "promo"), Utc::now())
            .unwrap();
        ledger
            .apply(7, TransactionDraft::unlock(1, "TB-A", 10), Utc::now())
            .unwrap();
        ledger
            .apply(7, TransactionDraft::purchase("ORD2", None, 50, 590.into()), Utc::now())
            .unwrap();
        ledger
            .apply(7, TransactionDraft::unlock(2, "TB-B", 10), Utc::now())
            .unwrap();

        assert_eq!(
            ledger.replay_balance(7).unwrap(),
            ledger.balance(7).unwrap()
        );
    }

    #[test]
    fn test_history_order_is_monotonic() {
        let ledger = ledger_with_balance(7, 0);
        for i in 0..5 {
            ledger
                .apply(7, TransactionDraft::bonus(10, &format!("grant {}", i)), Utc::now())
                .unwrap();
        }

        let history = ledger.history(7);
        let balances: Vec<i64> = history.iter().map(|e| e.balance_after).collect();
        assert_eq!(balances, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_all_accounts_sorted() {
        let ledger = LedgerStore::new();
        for tutor in [5, 1, 3] {
            ledger.open_account(tutor);
        }
        let tutors: Vec<UserId> = ledger.all_accounts().iter().map(|a| a.tutor).collect();
        assert_eq!(tutors, vec![1, 3, 5]);
    }
}
