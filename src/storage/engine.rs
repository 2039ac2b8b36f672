//! Thread-Safe Keyspace with Lazy Expiry
//!
//! This module implements the keyspace shared by every connection. It holds
//! two disjoint families of keys:
//!
//! - **strings**: key -> value, plus a side map key -> expiry deadline
//! - **hashes**: key -> (field -> value)
//!
//! A key may exist in both families at once; the two never see each other.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over 64 shards to reduce contention.
//! 2. **One RwLock per family per shard**: a write to a hash never blocks a
//!    read of a string, even when both live in the same shard.
//! 3. **Lazy Expiry**: There is no background sweep. A read that finds an
//!    expired string removes it under the write lock, re-checking first, so
//!    two racing readers cannot both evict the same entry.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ strings │ │ strings │ │ strings │ │ strings │  RwLock    │
//! │  │ hashes  │ │ hashes  │ │ hashes  │ │ hashes  │  RwLock    │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// String values and their expiry deadlines.
///
/// A key has an entry in `expires` only while it carries a TTL.
#[derive(Debug, Default)]
struct StringFamily {
    values: HashMap<Bytes, Bytes>,
    expires: HashMap<Bytes, Instant>,
}

impl StringFamily {
    #[inline]
    fn is_expired(&self, key: &[u8], now: Instant) -> bool {
        self.expires
            .get(key)
            .map(|deadline| now > *deadline)
            .unwrap_or(false)
    }

    /// Removes the key from both maps. Returns true if a value was present.
    fn evict(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key);
        self.values.remove(key).is_some()
    }
}

type HashFamily = HashMap<Bytes, HashMap<Bytes, Bytes>>;

/// A single shard containing a portion of the keyspace.
#[derive(Debug, Default)]
struct Shard {
    strings: RwLock<StringFamily>,
    hashes: RwLock<HashFamily>,
}

// A panic while holding a guard cannot leave the maps half-updated (every
// mutation is a single insert/remove), so a poisoned lock is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of keyspace counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Physically stored string keys (may include expired, not yet evicted ones)
    pub string_keys: u64,
    /// Stored hash keys
    pub hash_keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub hget_ops: u64,
    pub hset_ops: u64,
    pub del_ops: u64,
    /// String keys evicted because their TTL had passed
    pub expired: u64,
}

/// The keyspace shared by all connections.
///
/// Wrap it in an `Arc` and hand a clone to the command handler of every
/// connection. Separate instances are fully independent.
///
/// # Example
///
/// ```
/// use tidekv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set_string(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get_string(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_string(Bytes::from("session"), Bytes::from("abc"), Some(Duration::from_secs(60)));
///
/// engine.set_hash_field(Bytes::from("user:1"), Bytes::from("email"), Bytes::from("a@b.c"));
/// assert_eq!(engine.get_hash_field(b"user:1", b"email"), Some(Bytes::from("a@b.c")));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    hget_count: AtomicU64,
    hset_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            hget_count: AtomicU64::new(0),
            hset_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    // ========================================================================
    // String family
    // ========================================================================

    /// Stores a string value, overwriting any previous one.
    ///
    /// With `ttl`, the key expires `ttl` from now. Without it, any expiry left
    /// over from an earlier write is cleared.
    pub fn set_string(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        // A deadline past what Instant can represent means "never".
        let deadline = ttl.and_then(|ttl| Instant::now().checked_add(ttl));

        let mut strings = write(&self.get_shard(&key).strings);
        match deadline {
            Some(deadline) => {
                strings.expires.insert(key.clone(), deadline);
            }
            None => {
                strings.expires.remove(&key);
            }
        }
        strings.values.insert(key, value);
    }

    /// Returns the string stored at `key`.
    ///
    /// An expired key is removed from both maps and reported as absent.
    pub fn get_string(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // Fast path: shared lock for live or missing keys
        {
            let strings = read(&shard.strings);
            let value = strings.values.get(key)?;
            if !strings.is_expired(key, Instant::now()) {
                return Some(value.clone());
            }
        }

        let mut strings = write(&shard.strings);
        // Another writer may have replaced or evicted the key meanwhile.
        if strings.is_expired(key, Instant::now()) {
            if strings.evict(key) {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        }
        strings.values.get(key).cloned()
    }

    /// Reports whether either string map still physically holds `key`,
    /// without applying expiry.
    pub fn contains_raw(&self, key: &[u8]) -> bool {
        let strings = read(&self.get_shard(key).strings);
        strings.values.contains_key(key) || strings.expires.contains_key(key)
    }

    // ========================================================================
    // Hash family
    // ========================================================================

    /// Sets `field` in the hash at `key`, creating the hash if needed.
    ///
    /// Returns `true` if the field did not exist before.
    pub fn set_hash_field(&self, key: Bytes, field: Bytes, value: Bytes) -> bool {
        self.hset_count.fetch_add(1, Ordering::Relaxed);

        let mut hashes = write(&self.get_shard(&key).hashes);
        hashes
            .entry(key)
            .or_default()
            .insert(field, value)
            .is_none()
    }

    /// Returns `field` of the hash at `key`.
    pub fn get_hash_field(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        self.hget_count.fetch_add(1, Ordering::Relaxed);

        let hashes = read(&self.get_shard(key).hashes);
        hashes.get(key)?.get(field).cloned()
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// Removes `key` from both families.
    ///
    /// Returns `true` if a live entry was removed from either one. An expired
    /// string is evicted but does not count.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        let removed_string = {
            let mut strings = write(&shard.strings);
            let expired = strings.is_expired(key, Instant::now());
            let removed = strings.evict(key);
            if removed && expired {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }
            removed && !expired
        };

        let removed_hash = write(&shard.hashes).remove(key).is_some();

        removed_string || removed_hash
    }

    /// Number of stored keys across both families.
    ///
    /// A key present in both families counts twice; expired strings that were
    /// not yet accessed are included.
    pub fn len(&self) -> u64 {
        let stats = self.stats();
        stats.string_keys + stats.hash_keys
    }

    /// Returns true if neither family holds any key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns keyspace statistics.
    pub fn stats(&self) -> StorageStats {
        let (string_keys, hash_keys) = self.shards.iter().fold((0, 0), |(s, h), shard| {
            (
                s + read(&shard.strings).values.len() as u64,
                h + read(&shard.hashes).len() as u64,
            )
        });

        StorageStats {
            string_keys,
            hash_keys,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            hget_ops: self.hget_count.load(Ordering::Relaxed),
            hset_ops: self.hset_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
