//! Per-key sliding-window rate limiter.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};

type Hits = VecDeque<DateTime<Utc>>;

/// Admits at most `limit` events per key within any `window`.
///
/// Admission runs under the map's read lock, so [`purge`](Self::purge) never
/// drops a bucket while a hit is being recorded in it.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    buckets: RwLock<HashMap<String, Mutex<Hits>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Record an event for `key` at `now` if the key is under its limit.
    pub fn try_acquire(&self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(bucket) = self.buckets.read().get(key) {
            return self.admit(&mut bucket.lock(), now);
        }
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key.to_string()).or_default();
        self.admit(&mut bucket.lock(), now)
    }

    fn admit(&self, hits: &mut Hits, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        while hits.front().is_some_and(|t| *t < cutoff) {
            hits.pop_front();
        }

        if hits.len() >= self.limit {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Forget keys with no hit inside the window as of `now`. Returns how
    /// many went.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.lock().back().is_some_and(|t| *t >= cutoff));
        before - buckets.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_within_window() {
        let limiter = RateLimiter::new(3, Duration::seconds(30));
        let now = Utc::now();

        assert!(limiter.try_acquire("operator-1", now));
        assert!(limiter.try_acquire("operator-1", now + Duration::seconds(1)));
        assert!(limiter.try_acquire("operator-1", now + Duration::seconds(2)));
        assert!(!limiter.try_acquire("operator-1", now + Duration::seconds(3)));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::seconds(30));
        let now = Utc::now();

        assert!(limiter.try_acquire("operator-1", now));
        assert!(limiter.try_acquire("operator-2", now));
        assert!(!limiter.try_acquire("operator-1", now));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::seconds(30));
        let now = Utc::now();

        assert!(limiter.try_acquire("u", now));
        assert!(limiter.try_acquire("u", now + Duration::seconds(10)));
        assert!(!limiter.try_acquire("u", now + Duration::seconds(20)));
        // The first hit has left the window; the second has not.
        assert!(limiter.try_acquire("u", now + Duration::seconds(31)));
        assert!(!limiter.try_acquire("u", now + Duration::seconds(32)));
    }

    #[test]
    fn purge_forgets_idle_keys() {
        let limiter = RateLimiter::new(3, Duration::seconds(30));
        let now = Utc::now();
        for i in 0..1000 {
            assert!(limiter.try_acquire(&format!("user-{i}"), now));
        }
        assert!(limiter.try_acquire("recent", now + Duration::seconds(20)));
        assert_eq!(limiter.tracked_keys(), 1001);

        assert_eq!(limiter.purge(now + Duration::seconds(40)), 1000);
        assert_eq!(limiter.tracked_keys(), 1);

        // A purged key starts over with a full allowance.
        let later = now + Duration::seconds(40);
        for _ in 0..3 {
            assert!(limiter.try_acquire("user-0", later));
        }
        assert!(!limiter.try_acquire("user-0", later));
    }

    #[test]
    fn purge_keeps_keys_still_in_window() {
        let limiter = RateLimiter::new(1, Duration::seconds(30));
        let now = Utc::now();
        assert!(limiter.try_acquire("u", now));
        assert_eq!(limiter.purge(now + Duration::seconds(30)), 0);
        assert!(!limiter.try_acquire("u", now + Duration::seconds(30)));
    }
}
