//! Engine counters for operational visibility.
//! Plain process-wide atomics; exposition (if any) is the host's concern.

use std::sync::atomic::{AtomicU64, Ordering};

static DELTAS_APPLIED: AtomicU64 = AtomicU64::new(0);
static CROSSINGS_DETECTED: AtomicU64 = AtomicU64::new(0);
static CLAIMS_GRANTED: AtomicU64 = AtomicU64::new(0);
static CLAIMS_REJECTED: AtomicU64 = AtomicU64::new(0);
static PERSIST_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_deltas_applied() {
    DELTAS_APPLIED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_crossings_detected(n: u64) {
    CROSSINGS_DETECTED.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_claims_granted() {
    CLAIMS_GRANTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_claims_rejected() {
    CLAIMS_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_persist_failures() {
    PERSIST_FAILURES.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub deltas_applied: u64,
    pub crossings_detected: u64,
    pub claims_granted: u64,
    pub claims_rejected: u64,
    pub persist_failures: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        deltas_applied: DELTAS_APPLIED.load(Ordering::Relaxed),
        crossings_detected: CROSSINGS_DETECTED.load(Ordering::Relaxed),
        claims_granted: CLAIMS_GRANTED.load(Ordering::Relaxed),
        claims_rejected: CLAIMS_REJECTED.load(Ordering::Relaxed),
        persist_failures: PERSIST_FAILURES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    DELTAS_APPLIED.store(0, Ordering::Relaxed);
    CROSSINGS_DETECTED.store(0, Ordering::Relaxed);
    CLAIMS_GRANTED.store(0, Ordering::Relaxed);
    CLAIMS_REJECTED.store(0, Ordering::Relaxed);
    PERSIST_FAILURES.store(0, Ordering::Relaxed);
}
