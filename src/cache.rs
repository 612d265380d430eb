//! C5 — Result Cache (spec §4.6): fingerprint-keyed ready results plus a
//! single-flight in-flight space with leased ownership.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    HeldByOther { owner: String, expires_at: Instant },
    ReadyNow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Ok,
    NotOwner,
}

struct InFlightEntry {
    owner: String,
    lease_expires_at: Instant,
}

struct ReadyEntry {
    result_id: String,
    expires_at: Instant,
}

/// Mutex-guarded in-memory implementation (spec §4.6: "a single-process
/// in-memory implementation... suffices for non-replicated deployments").
/// Expiry is tracked against `Clock::monotonic` so lease/TTL comparisons are
/// immune to wall-clock adjustment.
pub struct ResultCache {
    clock: Arc<dyn Clock>,
    ready: Mutex<HashMap<String, ReadyEntry>>,
    in_flight: Mutex<HashMap<String, InFlightEntry>>,
}

impl ResultCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ready: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically: if a READY entry exists, return it; otherwise claim the
    /// in-flight slot unless another owner already holds an unexpired lease.
    pub fn try_claim(&self, fingerprint: &str, owner: &str, lease_duration: Duration) -> ClaimOutcome {
        if let Some(result_id) = self.lookup_ready(fingerprint) {
            return ClaimOutcome::ReadyNow(result_id);
        }

        let now = self.clock.monotonic();
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(entry) = in_flight.get(fingerprint) {
            if entry.lease_expires_at > now {
                return ClaimOutcome::HeldByOther {
                    owner: entry.owner.clone(),
                    expires_at: entry.lease_expires_at,
                };
            }
        }
        in_flight.insert(
            fingerprint.to_string(),
            InFlightEntry {
                owner: owner.to_string(),
                lease_expires_at: now + lease_duration,
            },
        );
        ClaimOutcome::Claimed
    }

    /// Releases the in-flight slot if `owner` holds it. A slot that is
    /// already gone (released, expired, or never claimed) is treated as a
    /// no-op success — only an owner mismatch is `NOT_OWNER`.
    pub fn release(&self, fingerprint: &str, owner: &str) -> ReleaseOutcome {
        let mut in_flight = self.in_flight.lock().unwrap();
        match in_flight.get(fingerprint) {
            Some(entry) if entry.owner == owner => {
                in_flight.remove(fingerprint);
                ReleaseOutcome::Ok
            }
            Some(_) => ReleaseOutcome::NotOwner,
            None => ReleaseOutcome::Ok,
        }
    }

    /// Publishes a ready result and releases the in-flight slot regardless of
    /// owner (only the worker that holds the lease is expected to call this).
    pub fn publish_ready(&self, fingerprint: &str, result_id: &str, ttl: Duration) {
        let expires_at = self.clock.monotonic() + ttl;
        self.ready.lock().unwrap().insert(
            fingerprint.to_string(),
            ReadyEntry {
                result_id: result_id.to_string(),
                expires_at,
            },
        );
        self.in_flight.lock().unwrap().remove(fingerprint);
    }

    /// Lazy eviction on read: an expired entry is removed and reported as a miss.
    pub fn lookup_ready(&self, fingerprint: &str) -> Option<String> {
        let mut ready = self.ready.lock().unwrap();
        match ready.get(fingerprint) {
            Some(entry) if entry.expires_at > self.clock.monotonic() => {
                Some(entry.result_id.clone())
            }
            Some(_) => {
                ready.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    /// Background sweep (spec §4.6: "eviction: lazy on read plus optional
    /// background sweep") — drops expired entries from both spaces without
    /// waiting for a read to trigger it.
    pub fn sweep_expired(&self) {
        let now = self.clock.monotonic();
        self.ready.lock().unwrap().retain(|_, e| e.expires_at > now);
        self.in_flight
            .lock()
            .unwrap()
            .retain(|_, e| e.lease_expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::at(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn first_claim_succeeds_second_is_held_by_other() {
        let c = clock();
        let cache = ResultCache::new(c);
        assert_eq!(
            cache.try_claim("fp1", "worker-a", Duration::from_secs(120)),
            ClaimOutcome::Claimed
        );
        match cache.try_claim("fp1", "worker-b", Duration::from_secs(120)) {
            ClaimOutcome::HeldByOther { owner, .. } => assert_eq!(owner, "worker-a"),
            other => panic!("expected HeldByOther, got {other:?}"),
        }
    }

    #[test]
    fn expired_lease_can_be_reclaimed() {
        let c = clock();
        let cache = ResultCache::new(c.clone());
        cache.try_claim("fp1", "worker-a", Duration::from_secs(10));
        c.advance(Duration::from_secs(11));
        assert_eq!(
            cache.try_claim("fp1", "worker-b", Duration::from_secs(10)),
            ClaimOutcome::Claimed
        );
    }

    #[test]
    fn release_by_non_owner_is_rejected() {
        let cache = ResultCache::new(clock());
        cache.try_claim("fp1", "worker-a", Duration::from_secs(120));
        assert_eq!(cache.release("fp1", "worker-b"), ReleaseOutcome::NotOwner);
        assert_eq!(cache.release("fp1", "worker-a"), ReleaseOutcome::Ok);
    }

    #[test]
    fn publish_ready_satisfies_subsequent_claims_without_recompute() {
        let cache = ResultCache::new(clock());
        cache.try_claim("fp1", "worker-a", Duration::from_secs(120));
        cache.publish_ready("fp1", "result-1", Duration::from_secs(3600));
        assert_eq!(
            cache.try_claim("fp1", "worker-b", Duration::from_secs(120)),
            ClaimOutcome::ReadyNow("result-1".to_string())
        );
        assert_eq!(cache.lookup_ready("fp1"), Some("result-1".to_string()));
    }

    #[test]
    fn ready_entry_expires_after_ttl() {
        let c = clock();
        let cache = ResultCache::new(c.clone());
        cache.publish_ready("fp1", "result-1", Duration::from_secs(60));
        c.advance(Duration::from_secs(61));
        assert_eq!(cache.lookup_ready("fp1"), None);
    }

    #[test]
    fn sweep_expired_clears_stale_entries() {
        let c = clock();
        let cache = ResultCache::new(c.clone());
        cache.try_claim("fp1", "worker-a", Duration::from_secs(10));
        cache.publish_ready("fp2", "result-2", Duration::from_secs(10));
        c.advance(Duration::from_secs(11));
        cache.sweep_expired();
        assert_eq!(
            cache.try_claim("fp1", "worker-b", Duration::from_secs(10)),
            ClaimOutcome::Claimed
        );
        assert_eq!(cache.lookup_ready("fp2"), None);
    }
}
