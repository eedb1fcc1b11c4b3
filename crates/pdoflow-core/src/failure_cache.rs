use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Per-worker mapping from posting id to remaining tolerated failures,
/// lazily defaulted on first access, plus the set of postings this
/// worker has given up on. See `spec.md` §4.3.
///
/// This state is strictly local to one worker process — it is never
/// shared with, or synchronized against, peers. The only cross-worker
/// signal is the posting's `status` column flipping to `ErroredOut`.
#[derive(Debug, Clone)]
pub struct FailureCache {
    default_value: i32,
    remaining: HashMap<Uuid, i32>,
    bad_postings: HashSet<Uuid>,
}

impl FailureCache {
    pub fn new(default_value: i32) -> Self {
        Self {
            default_value,
            remaining: HashMap::new(),
            bad_postings: HashSet::new(),
        }
    }

    /// Remaining tolerated failures for `posting_id`, defaulting (and
    /// recording the default) on first access.
    pub fn remaining(&mut self, posting_id: Uuid) -> i32 {
        *self
            .remaining
            .entry(posting_id)
            .or_insert(self.default_value)
    }

    fn set_remaining(&mut self, posting_id: Uuid, value: i32) {
        self.remaining.insert(posting_id, value);
    }

    pub fn is_blacklisted(&self, posting_id: Uuid) -> bool {
        self.bad_postings.contains(&posting_id)
    }

    /// Snapshot of every posting this worker currently refuses to
    /// serve, for use as the claim query's exclusion list
    /// (`spec.md` §4.1).
    pub fn blacklisted_postings(&self) -> Vec<Uuid> {
        self.bad_postings.iter().copied().collect()
    }

    pub fn blacklist(&mut self, posting_id: Uuid) {
        self.bad_postings.insert(posting_id);
    }

    /// Apply the non-transient-failure rules from `spec.md` §4.3 and
    /// report which actions the caller must additionally take on the
    /// job record and posting. The cache's own bookkeeping (decrement,
    /// blacklist insertion) happens here; mutating the `JobRecord` and
    /// `JobPosting` rows is left to the caller, which is why this
    /// returns a [`FailureOutcome`] rather than taking them by
    /// reference.
    pub fn record_failure(&mut self, posting_id: Uuid, tries_remaining: i32) -> FailureOutcome {
        let mut outcome = FailureOutcome::default();

        if self.remaining(posting_id) <= 0 {
            self.blacklist(posting_id);
            outcome.blacklist_posting = true;
            outcome.mark_record_terminally_failed = true;
        }

        if tries_remaining <= 1 {
            outcome.mark_record_terminally_failed = true;
            let next = self.remaining(posting_id) - 1;
            self.set_remaining(posting_id, next);
        } else {
            outcome.decrement_tries_and_retry = true;
        }

        outcome
    }
}

/// The set of follow-up actions a caller must take after
/// [`FailureCache::record_failure`]. At most one of
/// `mark_record_terminally_failed` / `decrement_tries_and_retry` is
/// meaningful for the job record (`mark_record_terminally_failed` wins
/// when both would otherwise apply, matching the original's sequential
/// `if`/`if`/`else` — see `spec.md` §4.3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub blacklist_posting: bool,
    pub mark_record_terminally_failed: bool,
    pub decrement_tries_and_retry: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_returns_default() {
        let mut cache = FailureCache::new(10);
        let id = Uuid::new_v4();
        assert_eq!(cache.remaining(id), 10);
    }

    #[test]
    fn independent_postings_track_separately() {
        let mut cache = FailureCache::new(5);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        cache.record_failure(p1, 5);
        assert_eq!(cache.remaining(p1), 5);
        assert_eq!(cache.remaining(p2), 5);
    }

    #[test]
    fn low_tries_remaining_marks_terminal_and_decrements_cache() {
        let mut cache = FailureCache::new(10);
        let posting = Uuid::new_v4();
        let outcome = cache.record_failure(posting, 1);
        assert!(outcome.mark_record_terminally_failed);
        assert!(!outcome.decrement_tries_and_retry);
        assert_eq!(cache.remaining(posting), 9);
    }

    #[test]
    fn ample_tries_remaining_requests_retry_without_touching_cache() {
        let mut cache = FailureCache::new(10);
        let posting = Uuid::new_v4();
        let outcome = cache.record_failure(posting, 3);
        assert!(!outcome.mark_record_terminally_failed);
        assert!(outcome.decrement_tries_and_retry);
        assert_eq!(cache.remaining(posting), 10);
    }

    #[test]
    fn exhausted_cache_blacklists_posting() {
        let mut cache = FailureCache::new(1);
        let posting = Uuid::new_v4();

        // First failure (low tries) drops the cache from 1 to 0.
        let first = cache.record_failure(posting, 1);
        assert!(!first.blacklist_posting);
        assert_eq!(cache.remaining(posting), 0);

        // Second failure observes remaining <= 0 and blacklists.
        let second = cache.record_failure(posting, 1);
        assert!(second.blacklist_posting);
        assert!(second.mark_record_terminally_failed);
        assert!(cache.is_blacklisted(posting));
    }

    #[test]
    fn blacklist_is_per_posting_not_global() {
        let mut cache = FailureCache::new(0);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        cache.record_failure(p1, 1);
        assert!(cache.is_blacklisted(p1));
        assert!(!cache.is_blacklisted(p2));
    }
}
