//! # Log Store Module
//!
//! The store façade tying the tail protocol, byte log, key tables, and
//! n-gram index together into an **append-only, lock-free key-value store
//! with substring search**.
//!
//! ## Write path
//!
//! Every mutation starts with a single fetch-and-add on the write tail
//! that grants the caller an internal key and an exclusive byte range at
//! once. The writer then fills its range without synchronization — offset
//! entry, value bytes, index postings — and finally retires the operation
//! by advancing the read tail in claim order.
//!
//! ```text
//! append:  claim ─► bounds ─► offsets[i]=o ─► log write ─► postings ─► commit
//! delete:  claim ─► bounds ─► CAS deleted[i]: 0 → token  ─► commit
//! update:  append of new value ─► CAS deleted[old] ─► commit
//! ```
//!
//! ## Read path
//!
//! Readers snapshot the read tail once and only touch state below it:
//! keys below `snapshot.key()` and bytes below `snapshot.offset()` are
//! fully published and immutable. A write becomes visible exactly when
//! its commit bump lands — that CAS is the linearization point.
//!
//! ## Deletes
//!
//! Deletion never touches the log or the index. It claims one tombstone
//! byte from the tail (so the tombstone has a place in the commit order)
//! and CAS-marks the key's delete slot with `claimed_offset + 1`. Readers
//! treat a key as deleted once their snapshot offset reaches the token.
//! Stale index postings are filtered at query time.
//!
//! ## Failure model
//!
//! [`StoreError::StoreFull`] is the only hard error. A claim that fails
//! its bounds check is never committed, and since claims are monotone,
//! every later claim fails the same check — a full store stays full, and
//! the read tail never waits on a claim that can still commit.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{info, trace};

use crate::index::{pack_gram, GramIndex, GRAM_N};
use crate::log::{ByteLog, SlotTable};
use crate::tail::{append_incr, Tail, TailWord, DEL_INCR};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`LogStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A claim would exceed the configured key or byte capacity. Once
    /// returned, every later mutation fails the same way.
    #[error("store full (key {key} of {max_keys}, byte {end} of {log_size})")]
    StoreFull {
        key: u32,
        max_keys: u32,
        end: u64,
        log_size: u32,
    },

    /// Rejected configuration at construction time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`LogStore`] instance.
///
/// Capacities are fixed at construction; the store never grows or shrinks.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on the number of internal keys.
    pub max_keys: u32,

    /// Upper bound on total log bytes (values plus tombstone bytes).
    pub log_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_keys: 1 << 27,
            log_size: u32::MAX,
        }
    }
}

/// Snapshot of store statistics returned by [`LogStore::stats`].
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Number of committed keys.
    pub num_keys: u32,
    /// Committed byte offset (values plus tombstone bytes).
    pub size_bytes: u32,
    /// Approximate distance between the write and read tails.
    pub gap: u64,
}

// ------------------------------------------------------------------------------------------------
// LogStore
// ------------------------------------------------------------------------------------------------

/// Lock-free, in-memory, append-only key-value store with substring
/// search.
///
/// Values are appended to a byte log and assigned dense, monotonically
/// increasing internal keys. Point lookup, tombstone deletion, update
/// (logical delete plus append), and n-gram substring search are all safe
/// under arbitrary concurrent writers and readers; no operation takes a
/// lock.
///
/// The handle is `Sync` — share it across threads with `Arc`.
pub struct LogStore {
    /// Claim/commit tails coordinating writers and readers.
    tail: Tail,

    /// Value payload bytes, indexed by absolute offset.
    data: ByteLog,

    /// Starting byte offset of each key's value.
    offsets: SlotTable,

    /// Delete markers: 0 = live, nonzero = tombstone token.
    deleted: SlotTable,

    /// N-gram postings over the byte log.
    index: GramIndex,

    config: StoreConfig,
}

impl LogStore {
    /// Creates an empty store with the given capacities.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        if config.max_keys == 0 {
            return Err(StoreError::InvalidConfig("max_keys must be nonzero".into()));
        }
        if config.log_size == 0 {
            return Err(StoreError::InvalidConfig("log_size must be nonzero".into()));
        }

        info!(
            "initializing log store, max_keys: {}, log_size: {}",
            config.max_keys, config.log_size
        );

        Ok(Self {
            tail: Tail::new(),
            data: ByteLog::new(config.log_size),
            offsets: SlotTable::new(config.max_keys),
            deleted: SlotTable::new(config.max_keys),
            index: GramIndex::new(),
            config,
        })
    }

    // --------------------------------------------------------------------------------------------
    // Writes
    // --------------------------------------------------------------------------------------------

    /// Appends a value and returns its internal key.
    ///
    /// The key is dense and never reused. Fails with
    /// [`StoreError::StoreFull`] when the key or byte capacity is
    /// exhausted.
    pub fn append(&self, value: &[u8]) -> Result<u32, StoreError> {
        let claimed = self.internal_append(value)?;
        self.tail.commit(claimed, append_incr(value.len() as u32));

        trace!(
            "append committed, key: {}, offset: {}, len: {}",
            claimed.key(),
            claimed.offset(),
            value.len()
        );
        Ok(claimed.key())
    }

    /// Deletes a key by marking its tombstone.
    ///
    /// Returns `Ok(false)` if the key does not exist yet or was already
    /// deleted; concurrent deletes of the same key have exactly one
    /// winner. The value bytes and index postings stay in place and are
    /// filtered out of reads at query time.
    pub fn delete(&self, key: u32) -> Result<bool, StoreError> {
        let claimed = self.tail.claim(DEL_INCR);
        let offset = claimed.offset();

        // A key counter past max_keys means an earlier append claim
        // failed and will never commit; this delete could never commit
        // behind it. Failed claims advance the write tail, so both
        // bounds are monotone and failure is absorbing.
        if claimed.key() > self.config.max_keys
            || u64::from(offset) + 1 > u64::from(self.config.log_size)
        {
            return Err(StoreError::StoreFull {
                key: claimed.key(),
                max_keys: self.config.max_keys,
                end: u64::from(offset) + 1,
                log_size: self.config.log_size,
            });
        }

        let deleted = if key >= claimed.key() {
            false
        } else {
            self.deleted.mark_if_zero(key, offset + 1)
        };

        // The claimed tombstone byte is retired win or lose, so the read
        // tail keeps advancing behind us.
        self.tail.commit(claimed, DEL_INCR);

        trace!("delete committed, key: {}, deleted: {}", key, deleted);
        Ok(deleted)
    }

    /// Replaces a key's value: appends the new value under a fresh key and
    /// tombstones the old one.
    ///
    /// Returns the new key — the same key a bare [`LogStore::append`]
    /// would have produced. The tombstone attempt is best-effort; a
    /// concurrent delete of the old key may win the race.
    pub fn update(&self, key: u32, value: &[u8]) -> Result<u32, StoreError> {
        let claimed = self.internal_append(value)?;

        if key < claimed.key() {
            self.deleted
                .mark_if_zero(key, claimed.offset().saturating_add(1));
        }

        self.tail.commit(claimed, append_incr(value.len() as u32));

        trace!(
            "update committed, old key: {}, new key: {}",
            key,
            claimed.key()
        );
        Ok(claimed.key())
    }

    /// Claims a key and byte range, fills them, and publishes postings.
    /// The caller commits.
    fn internal_append(&self, value: &[u8]) -> Result<TailWord, StoreError> {
        // A length that cannot fit in the offset half of an increment
        // would corrupt the key counter; reject before claiming.
        if value.len() > self.config.log_size as usize {
            return Err(StoreError::StoreFull {
                key: self.tail.snapshot().key(),
                max_keys: self.config.max_keys,
                end: value.len() as u64,
                log_size: self.config.log_size,
            });
        }

        let len = value.len() as u32;
        let claimed = self.tail.claim(append_incr(len));
        let key = claimed.key();
        let offset = claimed.offset();
        let end = u64::from(offset) + u64::from(len);

        if key >= self.config.max_keys || end > u64::from(self.config.log_size) {
            // Never committed; failure is absorbing for all later claims.
            return Err(StoreError::StoreFull {
                key,
                max_keys: self.config.max_keys,
                end,
                log_size: self.config.log_size,
            });
        }

        // Exclusive ownership of the key slot and byte range: plain
        // writes, no synchronization. The delete slot starts zeroed and
        // keys are never reused, so it needs no initialization.
        self.offsets.set(key, offset);
        self.data.write(offset, value);
        self.publish_grams(value, offset);

        Ok(claimed)
    }

    /// Publishes one posting per gram position of `value`. Values shorter
    /// than the gram width are unindexed (and unsearchable).
    fn publish_grams(&self, value: &[u8], offset: u32) {
        if value.len() < GRAM_N {
            return;
        }
        for k in 0..=(value.len() - GRAM_N) {
            self.index.append(pack_gram(&value[k..]), offset + k as u32);
        }
    }

    // --------------------------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------------------------

    /// Fetches the value of `key`, or `None` if the key is not yet
    /// committed or was deleted before this call's snapshot.
    ///
    /// The read covers the key's full log extent, from its offset to the
    /// next key's. Tombstone bytes claimed by deletes between the two
    /// appends fall inside that extent and come back as trailing zeros;
    /// callers that need exact payload lengths must frame their values.
    pub fn get(&self, key: u32) -> Option<Vec<u8>> {
        let snap = self.tail.snapshot();
        if key >= snap.key() {
            return None;
        }

        let token = self.deleted.get(key);
        if token != 0 && snap.offset() >= token {
            return None;
        }

        let start = self.offsets.get(key);
        let end = if key + 1 < snap.key() {
            self.offsets.get(key + 1)
        } else {
            snap.offset()
        };
        Some(self.data.read(start, end))
    }

    /// Finds every live key whose value contains `query` as a substring.
    ///
    /// Requires `query.len() >= GRAM_N`; shorter queries return no
    /// results. Results are deduplicated.
    pub fn search(&self, query: &[u8]) -> BTreeSet<u32> {
        let mut results = BTreeSet::new();
        self.scan_matches(query, |key| {
            results.insert(key);
        });
        results
    }

    /// Column-value variant of [`LogStore::search`]: hits go into a plain
    /// vector, order unspecified. Offsets are unique per key, so one key
    /// cannot repeat for a single matching position.
    pub fn col_search(&self, column_value: &[u8]) -> Vec<u32> {
        let mut results = Vec::new();
        self.scan_matches(column_value, |key| results.push(key));
        results
    }

    /// Shared search core: picks the shorter of the prefix/suffix posting
    /// lists, verifies each candidate against the log, and resolves
    /// surviving offsets to live keys.
    fn scan_matches(&self, query: &[u8], mut sink: impl FnMut(u32)) {
        let q = query.len();
        if q < GRAM_N {
            // Too short to form a gram; a known limitation.
            return;
        }

        let snap = self.tail.snapshot();
        let max_key = snap.key();
        let max_off = snap.offset();

        let prefix_list = self.index.get(pack_gram(&query[..GRAM_N]));
        let suffix_list = self.index.get(pack_gram(&query[q - GRAM_N..]));
        let prefix_len = prefix_list.map_or(0, |list| list.len());
        let suffix_len = suffix_list.map_or(0, |list| list.len());

        trace!(
            "search, query len: {}, prefix postings: {}, suffix postings: {}",
            q,
            prefix_len,
            suffix_len
        );

        if prefix_len <= suffix_len {
            let Some(list) = prefix_list else { return };
            let rest = &query[GRAM_N..];
            for i in 0..prefix_len {
                let off = list.get(i);
                // The whole candidate range must be committed; anything
                // below max_off is immutable.
                if u64::from(off) + q as u64 <= u64::from(max_off)
                    && self.data.range_eq(off + GRAM_N as u32, rest)
                {
                    self.resolve_key(off, max_key, max_off, &mut sink);
                }
            }
        } else {
            let Some(list) = suffix_list else { return };
            let rest = &query[..q - GRAM_N];
            let back = (q - GRAM_N) as u32;
            for i in 0..suffix_len {
                let off = list.get(i);
                // Candidates too close to the log start cannot hold the
                // query prefix.
                if off >= back && off < max_off && self.data.range_eq(off - back, rest) {
                    self.resolve_key(off, max_key, max_off, &mut sink);
                }
            }
        }
    }

    /// Resolves a data offset to its owning key and feeds it to `sink`
    /// unless the key was deleted before the snapshot.
    ///
    /// Keys are dense and offsets monotone, so the owner is found with a
    /// binary search over the offset table.
    fn resolve_key(&self, offset: u32, max_key: u32, max_off: u32, sink: &mut impl FnMut(u32)) {
        let mut lo = 0u32;
        let mut hi = max_key;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.offsets.get(mid) <= offset {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            return;
        }
        let key = lo - 1;

        let token = self.deleted.get(key);
        if token != 0 && max_off >= token {
            return;
        }
        sink(key);
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// Number of committed keys.
    pub fn num_keys(&self) -> u32 {
        self.tail.snapshot().key()
    }

    /// Committed byte offset: value bytes plus tombstone bytes.
    pub fn size(&self) -> u32 {
        self.tail.snapshot().offset()
    }

    /// Approximate distance between the write and read tails. Nonzero
    /// values mean claims are in flight (or permanently failed on a full
    /// store). Diagnostics only.
    pub fn gap(&self) -> u64 {
        self.tail.gap()
    }

    /// Snapshot of store statistics.
    pub fn stats(&self) -> StoreStats {
        let snap = self.tail.snapshot();
        StoreStats {
            num_keys: snap.key(),
            size_bytes: snap.offset(),
            gap: self.tail.gap(),
        }
    }
}
