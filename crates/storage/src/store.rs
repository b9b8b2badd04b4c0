//! In-memory capability store.

use crate::{CapabilityId, CapabilityRecord, CapabilityState, NewCapability};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Why a consume attempt did not transition the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeError<E> {
    /// No record under that id.
    Unknown,
    /// Past expiry, or already marked expired.
    Expired,
    /// Already consumed.
    Replay,
    /// The caller's binding check refused the record.
    Rejected(E),
}

/// Keyed capability storage.
///
/// Each record sits behind its own lock. The map lock is held only long
/// enough to find or insert a slot, so transitions on unrelated records never
/// wait on each other.
#[derive(Debug, Default)]
pub struct CapabilityStore {
    records: RwLock<HashMap<CapabilityId, Arc<Mutex<CapabilityRecord>>>>,
}

impl CapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a record under a fresh id and return a snapshot of it.
    ///
    /// Never overwrites an existing record.
    pub fn mint(&self, new: NewCapability) -> CapabilityRecord {
        let mut records = self.records.write();
        let id = loop {
            let candidate = CapabilityId::new();
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = CapabilityRecord::issue(id.clone(), new);
        records.insert(id, Arc::new(Mutex::new(record.clone())));
        record
    }

    /// Snapshot a record, marking it expired first if `now` is past expiry.
    pub fn get(&self, id: &CapabilityId, now: DateTime<Utc>) -> Option<CapabilityRecord> {
        let slot = self.slot(id)?;
        let mut record = slot.lock();
        record.expire_if_due(now);
        Some(record.clone())
    }

    /// Atomically validate and consume a record.
    ///
    /// Under the record's lock: expire if due, refuse terminal states, run
    /// `check` against the record, then move `Issued -> Consumed`. Two
    /// concurrent calls for the same id serialize on that lock, so at most
    /// one ever observes `Issued`. Every refusal leaves the record untouched
    /// apart from the lazy expiry mark.
    pub fn consume<E, F>(
        &self,
        id: &CapabilityId,
        now: DateTime<Utc>,
        consumer: &str,
        check: F,
    ) -> Result<CapabilityRecord, ConsumeError<E>>
    where
        F: FnOnce(&CapabilityRecord) -> Result<(), E>,
    {
        let slot = self.slot(id).ok_or(ConsumeError::Unknown)?;
        let mut record = slot.lock();

        if record.is_past_expiry(now) {
            record.expire_if_due(now);
            return Err(ConsumeError::Expired);
        }

        let state = record.state();
        if state.is_terminal() {
            return Err(match state {
                CapabilityState::Consumed => ConsumeError::Replay,
                _ => ConsumeError::Expired,
            });
        }

        check(&record).map_err(ConsumeError::Rejected)?;

        record.mark_consumed(now, consumer);
        Ok(record.clone())
    }

    /// Drop every record whose expiry has passed. Returns how many went.
    ///
    /// Unexpired records stay regardless of state, so a consumed token keeps
    /// answering as a replay until it would have expired anyway.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, slot| !slot.lock().is_past_expiry(now));
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &CapabilityId) -> Option<Arc<Mutex<CapabilityRecord>>> {
        self.records.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Barrier;

    fn new_capability(now: DateTime<Utc>, ttl: Duration) -> NewCapability {
        NewCapability {
            action_type: "crm:callback".into(),
            client_id: "C-105".into(),
            phone: "+79001234567".into(),
            issuer: "operator-1".into(),
            source_module: "mf-a".into(),
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    fn accept(_: &CapabilityRecord) -> Result<(), ()> {
        Ok(())
    }

    #[test]
    fn mint_creates_issued_record() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let record = store.mint(new_capability(now, Duration::seconds(30)));

        assert_eq!(record.state(), CapabilityState::Issued);
        assert_eq!(record.expires_at(), now + Duration::seconds(30));
        assert_eq!(store.get(record.id(), now), Some(record));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn consume_succeeds_once_then_replays() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(30))).id().clone();

        let consumed = store.consume(&id, now, "operator-1", accept).unwrap();
        assert_eq!(consumed.state(), CapabilityState::Consumed);
        assert_eq!(consumed.consumed_by(), Some("operator-1"));

        let again = store.consume(&id, now, "operator-1", accept);
        assert_eq!(again, Err(ConsumeError::Replay));
        assert_eq!(store.get(&id, now).unwrap().consumed_at(), Some(now));
    }

    #[test]
    fn unknown_id() {
        let store = CapabilityStore::new();
        let result = store.consume(&"cap-missing".into(), Utc::now(), "op", accept);
        assert_eq!(result, Err(ConsumeError::Unknown));
    }

    #[test]
    fn expired_consume_marks_record() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(1))).id().clone();
        let later = now + Duration::seconds(2);

        assert_eq!(
            store.consume(&id, later, "operator-1", accept),
            Err(ConsumeError::Expired)
        );
        assert_eq!(store.get(&id, now).unwrap().state(), CapabilityState::Expired);
        // Even with a clock that went backwards, expired stays expired.
        assert_eq!(
            store.consume(&id, now, "operator-1", accept),
            Err(ConsumeError::Expired)
        );
    }

    #[test]
    fn terminal_records_skip_the_check() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(30))).id().clone();
        store.consume(&id, now, "operator-1", accept).unwrap();

        let mut checked = false;
        let result = store.consume(&id, now, "operator-1", |_| {
            checked = true;
            Err("mismatch")
        });
        assert_eq!(result, Err(ConsumeError::Replay));
        assert!(!checked);
    }

    #[test]
    fn get_marks_expired_lazily() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(1))).id().clone();

        let seen = store.get(&id, now + Duration::seconds(5)).unwrap();
        assert_eq!(seen.state(), CapabilityState::Expired);
    }

    #[test]
    fn rejected_check_does_not_mutate() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(30))).id().clone();

        let result = store.consume(&id, now, "operator-1", |_| Err("mismatch"));
        assert_eq!(result, Err(ConsumeError::Rejected("mismatch")));

        let record = store.get(&id, now).unwrap();
        assert_eq!(record.state(), CapabilityState::Issued);
        assert_eq!(record.consumed_by(), None);
    }

    #[test]
    fn concurrent_consumers_have_one_winner() {
        const THREADS: usize = 32;
        let store = CapabilityStore::new();
        let now = Utc::now();
        let id = store.mint(new_capability(now, Duration::seconds(30))).id().clone();
        let barrier = Barrier::new(THREADS);

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let (store, id, barrier) = (&store, &id, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        store.consume(id, now, &format!("worker-{i}"), accept)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            outcomes
                .iter()
                .filter(|o| o.is_err())
                .all(|o| *o == Err(ConsumeError::Replay))
        );
    }

    #[test]
    fn purge_only_drops_expired() {
        let store = CapabilityStore::new();
        let now = Utc::now();
        let short = store.mint(new_capability(now, Duration::seconds(1))).id().clone();
        let long = store.mint(new_capability(now, Duration::seconds(60))).id().clone();
        store.consume(&long, now, "operator-1", accept).unwrap();

        assert_eq!(store.purge_expired(now + Duration::seconds(5)), 1);
        assert!(store.get(&short, now).is_none());
        assert_eq!(
            store.consume(&long, now, "operator-1", accept),
            Err(ConsumeError::Replay)
        );
    }
}
