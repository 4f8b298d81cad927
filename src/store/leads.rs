//! Lead store: lead documents, compound lookups, CAS transitions
//!
//! Transitions delegate to the pure state-machine methods on `Lead` while
//! holding the document's DashMap entry lock, which turns every status
//! check into a compare-and-swap: of two tutors racing to lock the same
//! lead, exactly one sees `status == Active` and wins; the other observes
//! `LeadUnavailable` and is never charged.
//!
//! Queries (`find_active_matches`, the expiry scans) return owned
//! snapshots: finite, restartable sequences, not live streams.

use crate::types::lead::{Lead, LeadId, LeadStatus, Priority, Requirements, StudentContact};
use crate::types::user::{TutorProfile, UserId};
use crate::types::EngineError;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Page window for matching queries
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Rows to skip
    pub offset: usize,
    /// Maximum rows to return
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            offset: 0,
            limit: 20,
        }
    }
}

/// Durable storage of lead documents
#[derive(Debug, Default)]
pub struct LeadStore {
    leads: DashMap<LeadId, Lead>,
    next_id: AtomicU64,
}

impl LeadStore {
    /// Create an empty lead store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new active lead
    pub fn create(
        &self,
        student: StudentContact,
        requirements: Requirements,
        priority: Priority,
        now: DateTime<Utc>,
        pool_expiry: Duration,
    ) -> Lead {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let lead = Lead::new(id, student, requirements, priority, now, pool_expiry);
        self.leads.insert(id, lead.clone());
        lead
    }

    /// Insert a pre-built lead document
    pub fn insert(&self, lead: Lead) {
        self.next_id.fetch_max(lead.id, Ordering::Relaxed);
        self.leads.insert(lead.id, lead);
    }

    /// Fetch a lead snapshot
    pub fn get(&self, lead: LeadId) -> Result<Lead, EngineError> {
        self.leads
            .get(&lead)
            .map(|entry| entry.clone())
            .ok_or_else(|| EngineError::lead_not_found(lead))
    }

    /// Active leads matching a tutor's profile
    ///
    /// Filters: active status, same city (case-insensitive), subject
    /// overlap, teaching-mode overlap, budget compatibility when the tutor
    /// has set an hourly rate, and not already matched to this tutor.
    /// Ordered newest-first, ties broken by priority descending.
    pub fn find_active_matches(
        &self,
        tutor: UserId,
        profile: &TutorProfile,
        page: Pagination,
    ) -> Vec<Lead> {
        let mut matches: Vec<Lead> = self
            .leads
            .iter()
            .filter(|entry| matches_profile(entry.value(), tutor, profile))
            .map(|entry| entry.clone())
            .collect();

        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.priority.cmp(&a.priority))
        });

        matches
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect()
    }

    /// Record that a tutor was notified about a lead
    ///
    /// Matched tutors are excluded from later `find_active_matches` calls.
    pub fn mark_matched(&self, lead: LeadId, tutor: UserId) -> Result<(), EngineError> {
        let mut entry = self
            .leads
            .get_mut(&lead)
            .ok_or_else(|| EngineError::lead_not_found(lead))?;
        if !entry.matched_tutors.contains(&tutor) {
            entry.matched_tutors.push(tutor);
        }
        Ok(())
    }

    /// CAS transition active → locked
    pub fn transition_lock(
        &self,
        lead: LeadId,
        tutor: UserId,
        credits: i64,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_lock(tutor, credits, now, duration))
    }

    /// CAS transition locked → active
    pub fn transition_release(&self, lead: LeadId) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_release())
    }

    /// CAS transition locked → active, only while `tutor` holds the lock
    ///
    /// Guards the expiry sweep against releasing a lock that was already
    /// released and re-taken by another tutor between the scan and the
    /// release.
    pub fn transition_release_if_held(
        &self,
        lead: LeadId,
        tutor: UserId,
    ) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| {
            if doc.lock.tutor != Some(tutor) {
                return Err(EngineError::lead_unavailable(doc.id, doc.status));
            }
            doc.apply_release()
        })
    }

    /// CAS transition locked → converted
    pub fn transition_convert(
        &self,
        lead: LeadId,
        tutor: UserId,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_convert(tutor, notes, now))
    }

    /// CAS transition (locked | active) → refunded for a refunding tutor
    ///
    /// A lead currently locked by a different tutor is left alone: that
    /// tutor's lock stands and the caller sees `NoUnlockFound`. Returns the
    /// status the lead held before the mark, so a failed refund can be
    /// rolled back with `unmark_refunded`.
    pub fn mark_refunded(
        &self,
        lead: LeadId,
        tutor: UserId,
        note: &str,
    ) -> Result<(LeadStatus, Lead), EngineError> {
        let mut entry = self
            .leads
            .get_mut(&lead)
            .ok_or_else(|| EngineError::lead_not_found(lead))?;
        if entry.status == LeadStatus::Locked && entry.lock.tutor != Some(tutor) {
            return Err(EngineError::no_unlock_found(tutor, lead));
        }
        let prior = entry.status;
        entry.apply_refund(note)?;
        Ok((prior, entry.clone()))
    }

    /// Roll a refund mark back to the prior status (refund compensation)
    pub fn unmark_refunded(&self, lead: LeadId, prior: LeadStatus) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_unrefund(prior))
    }

    /// CAS transition active → expired (pool expiry)
    pub fn mark_expired(&self, lead: LeadId) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_expire())
    }

    /// CAS transition active → cancelled
    pub fn mark_cancelled(&self, lead: LeadId, note: &str) -> Result<Lead, EngineError> {
        self.mutate(lead, |doc| doc.apply_cancel(note))
    }

    /// All locked leads whose lock lapsed before `now`
    pub fn find_expired_locks(&self, now: DateTime<Utc>) -> Vec<Lead> {
        self.leads
            .iter()
            .filter(|entry| entry.lock_expired(now))
            .map(|entry| entry.clone())
            .collect()
    }

    /// All active leads whose pool expiry lapsed before `now`
    pub fn find_pool_expired(&self, now: DateTime<Utc>) -> Vec<Lead> {
        self.leads
            .iter()
            .filter(|entry| entry.status == LeadStatus::Active && entry.expires_at < now)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Run a transition under the document's entry lock
    fn mutate<F>(&self, lead: LeadId, f: F) -> Result<Lead, EngineError>
    where
        F: FnOnce(&mut Lead) -> Result<(), EngineError>,
    {
        let mut entry = self
            .leads
            .get_mut(&lead)
            .ok_or_else(|| EngineError::lead_not_found(lead))?;
        f(&mut entry)?;
        Ok(entry.clone())
    }
}

fn matches_profile(lead: &Lead, tutor: UserId, profile: &TutorProfile) -> bool {
    if lead.status != LeadStatus::Active {
        return false;
    }
    if !lead
        .requirements
        .city
        .eq_ignore_ascii_case(&profile.city)
    {
        return false;
    }
    if !lead
        .requirements
        .subjects
        .iter()
        .any(|subject| profile.subjects.contains(subject))
    {
        return false;
    }
    if !profile
        .teaching_modes
        .iter()
        .any(|mode| mode.overlaps(lead.requirements.mode))
    {
        return false;
    }
    if let Some(rate) = profile.hourly_rate {
        if !lead.requirements.budget.accepts(rate) {
            return false;
        }
    }
    !lead.matched_tutors.contains(&tutor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::lead::{BudgetRange, TeachingMode};
    use crate::types::user::TutorMetrics;
    use rust_decimal::Decimal;

    fn student() -> StudentContact {
        StudentContact {
            id: 100,
            name: "Ravi".to_string(),
            phone: "9800000000".to_string(),
            email: "ravi@example.com".to_string(),
        }
    }

    fn requirements(city: &str, subject: &str, mode: TeachingMode) -> Requirements {
        Requirements {
            class_level: "Class 10".to_string(),
            subjects: vec![subject.to_string()],
            board: None,
            mode,
            city: city.to_string(),
            locality: None,
            budget: BudgetRange::default(),
            preferred_timing: None,
        }
    }

    fn profile(city: &str, subject: &str) -> TutorProfile {
        TutorProfile {
            city: city.to_string(),
            subjects: vec![subject.to_string()],
            teaching_modes: vec![TeachingMode::Online],
            hourly_rate: None,
            approved: true,
            active: true,
            featured: false,
            rating_average: Decimal::ZERO,
            profile_completion: 0,
            metrics: TutorMetrics::default(),
        }
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let store = LeadStore::new();
        let now = Utc::now();
        let a = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        let b = store.create(
            student(),
            requirements("Mumbai", "Physics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        assert!(b.id > a.id);
        assert_eq!(store.get(a.id).unwrap().status, LeadStatus::Active);
    }

    #[test]
    fn test_matching_filters() {
        let store = LeadStore::new();
        let now = Utc::now();
        let matching = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        // Wrong city.
        store.create(
            student(),
            requirements("Pune", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        // Wrong subject.
        store.create(
            student(),
            requirements("Mumbai", "History", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        // Incompatible mode.
        store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Offline),
            Priority::Normal,
            now,
            Duration::hours(24),
        );

        let found = store.find_active_matches(7, &profile("mumbai", "Mathematics"), Pagination::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, matching.id);
    }

    #[test]
    fn test_matching_respects_budget() {
        let store = LeadStore::new();
        let now = Utc::now();
        let mut reqs = requirements("Mumbai", "Mathematics", TeachingMode::Online);
        reqs.budget = BudgetRange {
            min: None,
            max: Some(Decimal::from(600)),
        };
        store.create(student(), reqs, Priority::Normal, now, Duration::hours(24));

        let mut pricey = profile("Mumbai", "Mathematics");
        pricey.hourly_rate = Some(Decimal::from(800));
        assert!(store
            .find_active_matches(7, &pricey, Pagination::default())
            .is_empty());

        let mut affordable = profile("Mumbai", "Mathematics");
        affordable.hourly_rate = Some(Decimal::from(500));
        assert_eq!(
            store
                .find_active_matches(7, &affordable, Pagination::default())
                .len(),
            1
        );
    }

    #[test]
    fn test_matching_excludes_already_matched_and_locked() {
        let store = LeadStore::new();
        let now = Utc::now();
        let a = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        let b = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );

        store.mark_matched(a.id, 7).unwrap();
        store
            .transition_lock(b.id, 9, 10, now, Duration::hours(2))
            .unwrap();

        assert!(store
            .find_active_matches(7, &profile("Mumbai", "Mathematics"), Pagination::default())
            .is_empty());
        // Another tutor still sees the unmatched (but not the locked) lead.
        let other = store.find_active_matches(8, &profile("Mumbai", "Mathematics"), Pagination::default());
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].id, a.id);
    }

    #[test]
    fn test_matching_order_newest_then_priority() {
        let store = LeadStore::new();
        let t0 = Utc::now();
        let old = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::High,
            t0 - Duration::hours(1),
            Duration::hours(24),
        );
        let new_normal = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            t0,
            Duration::hours(24),
        );
        let new_high = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::High,
            t0,
            Duration::hours(24),
        );

        let found = store.find_active_matches(7, &profile("Mumbai", "Mathematics"), Pagination::default());
        let ids: Vec<LeadId> = found.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![new_high.id, new_normal.id, old.id]);
    }

    #[test]
    fn test_lock_cas_single_winner() {
        let store = LeadStore::new();
        let now = Utc::now();
        let lead = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );

        store
            .transition_lock(lead.id, 7, 10, now, Duration::hours(2))
            .unwrap();
        let err = store
            .transition_lock(lead.id, 8, 10, now, Duration::hours(2))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::lead_unavailable(lead.id, LeadStatus::Locked)
        );
        assert_eq!(store.get(lead.id).unwrap().lock.tutor, Some(7));
    }

    #[test]
    fn test_release_if_held_guards_holder() {
        let store = LeadStore::new();
        let now = Utc::now();
        let lead = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        store
            .transition_lock(lead.id, 7, 10, now, Duration::hours(2))
            .unwrap();

        // A release on behalf of a stale holder leaves the lock alone.
        let err = store.transition_release_if_held(lead.id, 8).unwrap_err();
        assert_eq!(
            err,
            EngineError::lead_unavailable(lead.id, LeadStatus::Locked)
        );
        assert_eq!(store.get(lead.id).unwrap().lock.tutor, Some(7));

        let released = store.transition_release_if_held(lead.id, 7).unwrap();
        assert_eq!(released.status, LeadStatus::Active);
        assert_eq!(released.lock.tutor, None);
    }

    #[test]
    fn test_refund_mark_guarded_and_reversible() {
        let store = LeadStore::new();
        let now = Utc::now();
        let lead = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        store
            .transition_lock(lead.id, 7, 10, now, Duration::hours(2))
            .unwrap();

        // Another tutor's refund cannot break the live lock.
        let err = store.mark_refunded(lead.id, 8, "not mine").unwrap_err();
        assert_eq!(err, EngineError::no_unlock_found(8, lead.id));
        assert_eq!(store.get(lead.id).unwrap().status, LeadStatus::Locked);

        let (prior, refunded) = store.mark_refunded(lead.id, 7, "bad number").unwrap();
        assert_eq!(prior, LeadStatus::Locked);
        assert_eq!(refunded.status, LeadStatus::Refunded);

        let restored = store.unmark_refunded(lead.id, prior).unwrap();
        assert_eq!(restored.status, LeadStatus::Locked);
        assert_eq!(restored.lock.tutor, Some(7));
    }

    #[test]
    fn test_refund_mark_accepts_released_lead() {
        let store = LeadStore::new();
        let now = Utc::now();
        let lead = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            now,
            Duration::hours(24),
        );
        store
            .transition_lock(lead.id, 7, 10, now, Duration::hours(2))
            .unwrap();
        store.transition_release(lead.id).unwrap();

        let (prior, refunded) = store.mark_refunded(lead.id, 7, "lapsed lock").unwrap();
        assert_eq!(prior, LeadStatus::Active);
        assert_eq!(refunded.status, LeadStatus::Refunded);
    }

    #[test]
    fn test_expiry_scans() {
        let store = LeadStore::new();
        let t0 = Utc::now();
        let locked = store.create(
            student(),
            requirements("Mumbai", "Mathematics", TeachingMode::Online),
            Priority::Normal,
            t0,
            Duration::hours(24),
        );
        store
            .transition_lock(locked.id, 7, 10, t0, Duration::hours(2))
            .unwrap();
        let stale = store.create(
            student(),
            requirements("Mumbai", "Physics", TeachingMode::Online),
            Priority::Normal,
            t0 - Duration::hours(30),
            Duration::hours(24),
        );

        let expired_locks = store.find_expired_locks(t0 + Duration::hours(3));
        assert_eq!(expired_locks.len(), 1);
        assert_eq!(expired_locks[0].id, locked.id);
        assert!(store.find_expired_locks(t0 + Duration::hours(1)).is_empty());

        let pool_expired = store.find_pool_expired(t0);
        assert_eq!(pool_expired.len(), 1);
        assert_eq!(pool_expired[0].id, stale.id);
    }
}
