//! Keyspace with Expiry Support
//!
//! This module implements the shared store behind every client connection.
//!
//! ## Design Decisions
//!
//! 1. **One joint lock**: values and expiration deadlines live in two maps
//!    guarded by a single `RwLock`, so no reader can observe a deadline for a
//!    key that has no value.
//! 2. **Active expiry only**: `get` never looks at deadlines. Expired keys are
//!    physically removed by the sweeper (see `expiry.rs`), so a key may be
//!    readable for up to one sweep interval past its deadline. `ttl` is the
//!    exception and reports a passed deadline as a missing key.
//! 3. **No I/O under the lock**: every operation takes the lock, touches the
//!    maps and releases it before returning.
//!
//! ```text
//! ┌────────────────────────── Store ──────────────────────────┐
//! │                RwLock<Keyspace>                           │
//! │  ┌─────────────────────┐    ┌──────────────────────────┐  │
//! │  │ values              │    │ expirations              │  │
//! │  │ HashMap<Bytes,Bytes>│ ⊇  │ HashMap<Bytes, Instant>  │  │
//! │  └─────────────────────┘    └──────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deadline used when `now + seconds` does not fit the clock.
/// Roughly a century, which no client will outlive.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// TTL reported for a key that does not exist (or whose deadline passed).
pub const TTL_MISSING: i64 = -2;

/// TTL reported for a key without a deadline.
pub const TTL_PERSISTENT: i64 = -1;

/// The two maps guarded by the store's lock.
#[derive(Debug, Default)]
struct Keyspace {
    values: HashMap<Bytes, Bytes>,
    expirations: HashMap<Bytes, Instant>,
}

/// The in-memory key-value store.
///
/// The store is designed to be wrapped in an `Arc` and shared across all
/// client handler tasks and the expiry sweeper. All operations are
/// thread-safe and none of them can fail.
///
/// # Example
///
/// ```
/// use minikv::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
///
/// store.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(store.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// assert!(store.expire(&Bytes::from("name"), 60));
/// assert!((0..=60).contains(&store.ttl(&Bytes::from("name"))));
/// ```
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Keyspace>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a value.
    ///
    /// An existing deadline on the key is left untouched.
    pub fn set(&self, key: Bytes, value: Bytes) {
        let mut keyspace = self.inner.write();
        keyspace.values.insert(key, value);
    }

    /// Returns the current value, whether or not its deadline has passed.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let keyspace = self.inner.read();
        keyspace.values.get(key).cloned()
    }

    /// Removes the given keys and returns how many of them existed.
    ///
    /// Deadlines of removed keys are left for the sweeper, which drops them
    /// on its next pass.
    pub fn del(&self, keys: &[Bytes]) -> usize {
        let mut keyspace = self.inner.write();
        keys.iter()
            .filter(|key| keyspace.values.remove(*key).is_some())
            .count()
    }

    /// Sets the key to expire `seconds` from now.
    ///
    /// Returns `false` if the key does not exist. Zero or negative seconds are
    /// accepted and yield a deadline that has already passed.
    pub fn expire(&self, key: &Bytes, seconds: i64) -> bool {
        let mut keyspace = self.inner.write();
        if !keyspace.values.contains_key(key) {
            return false;
        }

        let deadline = deadline_after(Instant::now(), seconds);
        keyspace.expirations.insert(key.clone(), deadline);
        true
    }

    /// Returns the remaining time to live in whole seconds.
    ///
    /// - [`TTL_MISSING`] (`-2`) if the key does not exist or its deadline has
    ///   passed, even if the sweeper has not removed it yet
    /// - [`TTL_PERSISTENT`] (`-1`) if the key exists without a deadline
    pub fn ttl(&self, key: &Bytes) -> i64 {
        let keyspace = self.inner.read();
        if !keyspace.values.contains_key(key) {
            return TTL_MISSING;
        }

        match keyspace.expirations.get(key) {
            None => TTL_PERSISTENT,
            Some(&deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    TTL_MISSING
                } else {
                    (deadline - now).as_secs() as i64
                }
            }
        }
    }

    /// Removes every key whose deadline has passed, from both maps.
    ///
    /// Returns the number of values that were actually removed. Deadlines
    /// whose value was already deleted are dropped without being counted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut keyspace = self.inner.write();
        let Keyspace {
            values,
            expirations,
        } = &mut *keyspace;

        let mut purged = 0;
        expirations.retain(|key, deadline| {
            if *deadline > now {
                return true;
            }
            if values.remove(key).is_some() {
                purged += 1;
            }
            false
        });

        purged
    }

    /// Returns the number of stored keys, including expired ones not yet
    /// swept.
    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys carrying a deadline.
    pub fn expiring_len(&self) -> usize {
        self.inner.read().expirations.len()
    }
}

fn deadline_after(now: Instant, seconds: i64) -> Instant {
    let offset = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        now.checked_add(offset)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    } else {
        now.checked_sub(offset).unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let store = Store::new();

        store.set(key("name"), key("Ariz"));
        assert_eq!(store.get(&key("name")), Some(key("Ariz")));
    }

    #[test]
    fn test_set_overwrites() {
        let store = Store::new();

        store.set(key("k"), key("v1"));
        store.set(key("k"), key("v2"));
        assert_eq!(store.get(&key("k")), Some(key("v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let store = Store::new();

        assert_eq!(store.get(&key("nope")), None);
        assert_eq!(store.ttl(&key("nope")), TTL_MISSING);
        assert_eq!(store.del(&[key("nope")]), 0);
    }

    #[test]
    fn test_del_counts_existing_keys() {
        let store = Store::new();
        store.set(key("a"), key("1"));
        store.set(key("b"), key("2"));

        assert_eq!(store.del(&[key("a"), key("b"), key("c")]), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_del_is_idempotent() {
        let store = Store::new();
        store.set(key("a"), key("1"));

        assert_eq!(store.del(&[key("a")]), 1);
        assert_eq!(store.del(&[key("a")]), 0);
    }

    #[test]
    fn test_del_same_key_twice_in_one_call() {
        let store = Store::new();
        store.set(key("a"), key("1"));

        assert_eq!(store.del(&[key("a"), key("a")]), 1);
    }

    #[test]
    fn test_expire_missing_key() {
        let store = Store::new();

        assert!(!store.expire(&key("nope"), 10));
        assert_eq!(store.expiring_len(), 0);
    }

    #[test]
    fn test_ttl_without_expiry() {
        let store = Store::new();
        store.set(key("k"), key("v"));

        assert_eq!(store.ttl(&key("k")), TTL_PERSISTENT);
    }

    #[test]
    fn test_ttl_after_expire() {
        let store = Store::new();
        store.set(key("k"), key("v"));

        assert!(store.expire(&key("k"), 100));
        let ttl = store.ttl(&key("k"));
        assert!(ttl > 0 && ttl <= 100, "ttl was {}", ttl);
    }

    #[test]
    fn test_ttl_decreases() {
        let store = Store::new();
        store.set(key("k"), key("v"));
        store.expire(&key("k"), 2);

        let first = store.ttl(&key("k"));
        thread::sleep(Duration::from_millis(1100));
        let second = store.ttl(&key("k"));
        assert!(second < first, "{} should be below {}", second, first);
    }

    #[test]
    fn test_expired_key_still_readable_until_swept() {
        let store = Store::new();
        store.set(key("k"), key("v"));
        store.expire(&key("k"), 0);

        // ttl treats the passed deadline as gone, get does not
        assert_eq!(store.ttl(&key("k")), TTL_MISSING);
        assert_eq!(store.get(&key("k")), Some(key("v")));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get(&key("k")), None);
        assert_eq!(store.expiring_len(), 0);
    }

    #[test]
    fn test_negative_expire_is_already_expired() {
        let store = Store::new();
        store.set(key("k"), key("v"));

        assert!(store.expire(&key("k"), -10));
        assert_eq!(store.ttl(&key("k")), TTL_MISSING);
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn test_huge_expire_does_not_panic() {
        let store = Store::new();
        store.set(key("k"), key("v"));

        assert!(store.expire(&key("k"), i64::MAX));
        assert!(store.ttl(&key("k")) > 0);
        assert!(store.expire(&key("k"), i64::MIN));
        assert_eq!(store.ttl(&key("k")), TTL_MISSING);
    }

    #[test]
    fn test_set_keeps_existing_deadline() {
        let store = Store::new();
        store.set(key("k"), key("v1"));
        store.expire(&key("k"), 100);

        store.set(key("k"), key("v2"));
        assert!(store.ttl(&key("k")) >= 0);
    }

    #[test]
    fn test_purge_leaves_live_keys() {
        let store = Store::new();
        store.set(key("old"), key("v"));
        store.set(key("new"), key("v"));
        store.set(key("plain"), key("v"));
        store.expire(&key("old"), -1);
        store.expire(&key("new"), 100);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.expiring_len(), 1);
        assert!(store.get(&key("new")).is_some());
        assert!(store.get(&key("plain")).is_some());
    }

    #[test]
    fn test_purge_tolerates_deleted_values() {
        let store = Store::new();
        store.set(key("k"), key("v"));
        store.expire(&key("k"), -1);
        store.del(&[key("k")]);

        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.expiring_len(), 0);
    }

    #[test]
    fn test_recreated_key_inherits_stale_deadline() {
        let store = Store::new();
        store.set(key("k"), key("v"));
        store.expire(&key("k"), -1);
        store.del(&[key("k")]);

        // A key recreated before the sweep inherits the stale deadline.
        store.set(key("k"), key("again"));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get(&key("k")), None);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(Store::new());
        let mut handles = vec![];

        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let k = key(&format!("t{}:k{}", t, i));
                    store.set(k.clone(), key(&i.to_string()));
                    assert_eq!(store.get(&k), Some(key(&i.to_string())));
                    if i % 2 == 0 {
                        assert_eq!(store.del(&[k]), 1);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8 * 500);
    }
}
