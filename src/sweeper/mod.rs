//! Background housekeeping
//!
//! Two periodic jobs run against the shared stores:
//!
//! - the expiry sweep releases lapsed contact locks (no refund; the tutor
//!   had the exclusivity window they paid for) and retires active leads
//!   whose pool window elapsed
//! - the maintenance pass recomputes tutor ranking scores and re-alerts
//!   tutors sitting at or below the low-balance threshold
//!
//! Every lead is processed in isolation: one bad document is logged and
//! counted, never aborts the sweep.

use crate::engine::CreditEngine;
use crate::notify::Event;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters from one expiry sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Lapsed locks released back to the pool
    pub released_locks: u64,
    /// Active leads retired on pool expiry
    pub pool_expired: u64,
    /// Leads that failed to process
    pub errors: u64,
}

/// Release lapsed locks and retire pool-expired leads
///
/// Lock release preserves the lead's cumulative `unlock_count` and writes a
/// zero-amount `expiry` marker to the former holder's ledger for audit.
/// Credits are never returned here; refunds are a distinct, admin-gated
/// operation.
pub fn run_expiry_sweep(engine: &CreditEngine, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    for lead in engine.leads().find_expired_locks(now) {
        match engine.unlock_expiry(lead.id, now) {
            Ok(_) => report.released_locks += 1,
            Err(e) => {
                // Raced with a convert/refund that beat the sweep; the lead
                // is no longer ours to release.
                debug!(lead = lead.id, error = %e, "lock release skipped");
                report.errors += 1;
            }
        }
    }

    for lead in engine.leads().find_pool_expired(now) {
        match engine.leads().mark_expired(lead.id) {
            Ok(_) => report.pool_expired += 1,
            Err(e) => {
                debug!(lead = lead.id, error = %e, "pool expiry skipped");
                report.errors += 1;
            }
        }
    }

    if report.released_locks > 0 || report.pool_expired > 0 || report.errors > 0 {
        info!(
            released = report.released_locks,
            expired = report.pool_expired,
            errors = report.errors,
            "expiry sweep complete"
        );
    }
    report
}

/// Recompute ranking scores for every approved tutor
pub fn run_ranking_refresh(engine: &CreditEngine) -> u64 {
    let mut refreshed = 0;
    for (tutor, _) in engine.directory().approved_tutors() {
        match engine
            .directory()
            .update_tutor(tutor, |profile| profile.recompute_ranking())
        {
            Ok(()) => refreshed += 1,
            Err(e) => warn!(tutor, error = %e, "ranking refresh failed"),
        }
    }
    debug!(refreshed, "ranking refresh complete");
    refreshed
}

/// Re-alert active tutors sitting below the low-balance threshold
///
/// Zero-balance accounts are excluded: a tutor who never topped up gets
/// onboarding nudges elsewhere, not a running-low alert.
pub fn run_low_balance_scan(engine: &CreditEngine) -> u64 {
    let threshold = engine.config().low_balance_threshold;
    let mut alerted = 0;
    for account in engine.ledger().all_accounts() {
        if account.balance <= 0 || account.balance >= threshold {
            continue;
        }
        let active = engine
            .directory()
            .tutor_profile(account.tutor)
            .map(|profile| profile.active)
            .unwrap_or(false);
        if active {
            engine.publish(Event::LowBalance {
                tutor: account.tutor,
                balance: account.balance,
            });
            alerted += 1;
        }
    }
    alerted
}

/// Run both jobs on their configured intervals, forever
pub async fn run(engine: Arc<CreditEngine>) {
    let sweep_every = std::time::Duration::from_secs(engine.config().sweep_interval_secs);
    let maintain_every =
        std::time::Duration::from_secs(engine.config().maintenance_interval_secs);
    let mut sweep = tokio::time::interval(sweep_every);
    let mut maintain = tokio::time::interval(maintain_every);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                run_expiry_sweep(&engine, Utc::now());
            }
            _ = maintain.tick() => {
                run_ranking_refresh(&engine);
                run_low_balance_scan(&engine);
            }
        }
    }
}
