//! Lead types and the lead state machine
//!
//! A lead is a student's tutoring requirement, exposed to tutors as a
//! purchasable contact opportunity. Student contact details are snapshotted
//! onto the lead at creation time (denormalized, not live-joined).
//!
//! State transitions are pure functions on the `Lead` value: they validate
//! the current status and mutate the document, but never touch storage.
//! The `LeadStore` applies them inside its per-entry locks, which is what
//! turns the status check into a compare-and-swap.
//!
//! # Legal transitions
//!
//! - active → locked (unlock)
//! - locked → active (release on expiry or manual unlock)
//! - locked → converted
//! - locked → refunded, active → refunded (a refund may land after the
//!   lock lapsed and the lead returned to the pool)
//! - active → expired (pool expiry)
//! - active → cancelled
//!
//! Anything else is rejected with `InvalidState`/`LeadUnavailable`.

use super::error::EngineError;
use super::user::UserId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lead identifier
pub type LeadId = u64;

/// Lead lifecycle status
///
/// Terminal states are soft: the document is never physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    /// In the pool, visible to matching tutors
    Active,
    /// Exclusively claimed by one tutor until the lock expires
    Locked,
    /// Converted into a tutoring engagement by the lock holder
    Converted,
    /// Pool expiry elapsed without a conversion
    Expired,
    /// Withdrawn by the student or an admin
    Cancelled,
    /// Unlock credits were refunded to the tutor
    Refunded,
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeadStatus::Active => "active",
            LeadStatus::Locked => "locked",
            LeadStatus::Converted => "converted",
            LeadStatus::Expired => "expired",
            LeadStatus::Cancelled => "cancelled",
            LeadStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Teaching mode offered by a tutor or requested by a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeachingMode {
    /// Remote lessons only
    Online,
    /// In-person lessons only
    Offline,
    /// Either mode works
    Both,
}

impl TeachingMode {
    /// Whether two modes are compatible (`Both` matches everything)
    pub fn overlaps(self, other: TeachingMode) -> bool {
        self == other || self == TeachingMode::Both || other == TeachingMode::Both
    }
}

/// Lead priority, used as the tie-breaker after recency in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Deprioritized lead
    Low,
    /// Default priority
    Normal,
    /// Boosted lead
    High,
}

/// Student contact snapshot captured at lead creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentContact {
    /// Student user identifier
    pub id: UserId,
    /// Student name at creation time
    pub name: String,
    /// Student phone at creation time
    pub phone: String,
    /// Student email at creation time
    pub email: String,
}

/// Monthly budget range the student is willing to pay
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetRange {
    /// Lower bound, if stated
    pub min: Option<Decimal>,
    /// Upper bound, if stated
    pub max: Option<Decimal>,
}

impl BudgetRange {
    /// Whether a tutor charging `rate` fits this budget
    ///
    /// An absent upper bound accepts any rate, mirroring the matching query
    /// of the lead pool.
    pub fn accepts(&self, rate: Decimal) -> bool {
        match self.max {
            Some(max) => max >= rate,
            None => true,
        }
    }
}

/// What the student is asking for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// Class or level (e.g. "Class 10")
    pub class_level: String,
    /// Subjects requested
    pub subjects: Vec<String>,
    /// Examination board, if relevant
    pub board: Option<String>,
    /// Requested teaching mode
    pub mode: TeachingMode,
    /// City the student is in
    pub city: String,
    /// Locality within the city
    pub locality: Option<String>,
    /// Budget range
    pub budget: BudgetRange,
    /// Preferred timing free text
    pub preferred_timing: Option<String>,
}

/// Lock metadata for a lead
///
/// `unlock_count` is cumulative across lock cycles; it only ever
/// increments, even as the lead bounces between active and locked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LockInfo {
    /// Tutor currently holding the lock
    pub tutor: Option<UserId>,
    /// When the current lock was taken
    pub locked_at: Option<DateTime<Utc>>,
    /// When the current lock lapses
    pub expires_at: Option<DateTime<Utc>>,
    /// Credits deducted for the current lock
    pub credits_deducted: i64,
    /// How many times this lead has been unlocked, across all tutors
    pub unlock_count: u32,
}

/// Conversion metadata set when a locked lead becomes an engagement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// When the conversion was recorded
    pub converted_at: DateTime<Utc>,
    /// Tutor who converted the lead
    pub converted_by: UserId,
    /// Free-text notes
    pub notes: String,
}

/// A student lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Internal lead identifier
    pub id: LeadId,
    /// Human-readable lead reference (`TB-` prefixed, generated)
    pub lead_ref: String,
    /// Student contact snapshot
    pub student: StudentContact,
    /// Requirement fields used for matching
    pub requirements: Requirements,
    /// Current lifecycle status
    pub status: LeadStatus,
    /// Lock metadata
    pub lock: LockInfo,
    /// Tutors already notified about this lead (excluded from re-matching)
    pub matched_tutors: Vec<UserId>,
    /// Conversion metadata, once converted
    pub conversion: Option<Conversion>,
    /// Matching tie-breaker
    pub priority: Priority,
    /// Admin annotations (refund reasons, manual notes)
    pub admin_notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Pool expiry, distinct from lock expiry
    pub expires_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new active lead
    ///
    /// Generates the human-readable reference and sets the pool expiry
    /// relative to `now`.
    pub fn new(
        id: LeadId,
        student: StudentContact,
        requirements: Requirements,
        priority: Priority,
        now: DateTime<Utc>,
        pool_expiry: Duration,
    ) -> Self {
        Lead {
            id,
            lead_ref: generate_lead_ref(),
            student,
            requirements,
            status: LeadStatus::Active,
            lock: LockInfo::default(),
            matched_tutors: Vec::new(),
            conversion: None,
            priority,
            admin_notes: None,
            created_at: now,
            expires_at: now + pool_expiry,
        }
    }

    /// Whether the current lock has lapsed at `now`
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == LeadStatus::Locked
            && self.lock.expires_at.is_some_and(|expiry| expiry < now)
    }

    /// Transition active → locked
    ///
    /// Fails with `LeadUnavailable` unless the lead is currently active;
    /// the store runs this under the entry lock, making it the
    /// compare-and-swap that decides concurrent unlock races.
    pub fn apply_lock(
        &mut self,
        tutor: UserId,
        credits: i64,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Result<(), EngineError> {
        if self.status != LeadStatus::Active {
            return Err(EngineError::lead_unavailable(self.id, self.status));
        }

        self.status = LeadStatus::Locked;
        self.lock = LockInfo {
            tutor: Some(tutor),
            locked_at: Some(now),
            expires_at: Some(now + duration),
            credits_deducted: credits,
            unlock_count: self.lock.unlock_count + 1,
        };
        Ok(())
    }

    /// Transition locked → active (release the lock)
    ///
    /// Clears the lock holder and timestamps but preserves `unlock_count`.
    pub fn apply_release(&mut self) -> Result<(), EngineError> {
        if self.status != LeadStatus::Locked {
            return Err(EngineError::invalid_state(
                self.id,
                "release",
                LeadStatus::Locked,
                self.status,
            ));
        }

        self.status = LeadStatus::Active;
        self.lock = LockInfo {
            tutor: None,
            locked_at: None,
            expires_at: None,
            credits_deducted: 0,
            unlock_count: self.lock.unlock_count,
        };
        Ok(())
    }

    /// Transition locked → converted
    ///
    /// Only the tutor holding the lock may convert.
    pub fn apply_convert(
        &mut self,
        tutor: UserId,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.status != LeadStatus::Locked {
            return Err(EngineError::invalid_state(
                self.id,
                "convert",
                LeadStatus::Locked,
                self.status,
            ));
        }
        if self.lock.tutor != Some(tutor) {
            return Err(EngineError::lead_unavailable(self.id, self.status));
        }

        self.status = LeadStatus::Converted;
        self.conversion = Some(Conversion {
            converted_at: now,
            converted_by: tutor,
            notes: notes.to_string(),
        });
        Ok(())
    }

    /// Transition (locked | active) → refunded
    ///
    /// Both source states are legal: the refund may arrive while the
    /// tutor still holds the lock, or after the lock lapsed and the lead
    /// went back to the pool.
    pub fn apply_refund(&mut self, note: &str) -> Result<(), EngineError> {
        if !matches!(self.status, LeadStatus::Locked | LeadStatus::Active) {
            return Err(EngineError::invalid_state(
                self.id,
                "refund",
                LeadStatus::Locked,
                self.status,
            ));
        }

        self.status = LeadStatus::Refunded;
        self.admin_notes = Some(note.to_string());
        Ok(())
    }

    /// Roll a refund mark back to `prior`
    ///
    /// Compensation for a refund whose ledger credit failed; only legal on
    /// a refunded lead.
    pub fn apply_unrefund(&mut self, prior: LeadStatus) -> Result<(), EngineError> {
        if self.status != LeadStatus::Refunded {
            return Err(EngineError::invalid_state(
                self.id,
                "unrefund",
                LeadStatus::Refunded,
                self.status,
            ));
        }

        self.status = prior;
        self.admin_notes = None;
        Ok(())
    }

    /// Transition active → expired (pool expiry)
    pub fn apply_expire(&mut self) -> Result<(), EngineError> {
        if self.status != LeadStatus::Active {
            return Err(EngineError::invalid_state(
                self.id,
                "expire",
                LeadStatus::Active,
                self.status,
            ));
        }

        self.status = LeadStatus::Expired;
        Ok(())
    }

    /// Transition active → cancelled
    pub fn apply_cancel(&mut self, note: &str) -> Result<(), EngineError> {
        if self.status != LeadStatus::Active {
            return Err(EngineError::invalid_state(
                self.id,
                "cancel",
                LeadStatus::Active,
                self.status,
            ));
        }

        self.status = LeadStatus::Cancelled;
        self.admin_notes = Some(note.to_string());
        Ok(())
    }
}

/// Generate a human-readable lead reference
///
/// Format: `TB-` followed by eight characters of a v4 UUID, uppercased.
fn generate_lead_ref() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TB-{}", &raw[..8])
}
