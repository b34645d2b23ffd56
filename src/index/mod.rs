//! # N-gram Index Module
//!
//! Maps every distinct `GRAM_N`-byte sequence appearing in the byte log to
//! the offsets at which it begins. The index is **writer-append-only** and
//! **reader-snapshot**: entries are never removed, and stale hits (deleted
//! or not-yet-committed values) are filtered by the store at query time
//! against a read-tail snapshot.
//!
//! ## Structure
//!
//! Grams are packed big-endian into a `u32` and used as an address into a
//! two-level radix table of lazily CAS-allocated pages, each entry holding
//! a [`PostingList`]. No hashing and no locks anywhere.
//!
//! ```text
//! gram bytes ──pack──► u32 ──► root page ──► leaf page ──► PostingList
//! ```
//!
//! ## Posting lists
//!
//! A posting list is an append-only `u32` sequence stored in exponentially
//! growing chunks. Appends reserve a slot with a fetch-and-add, write the
//! entry, then publish it with an ordered CAS on the committed length — a
//! miniature claim/commit. Readers snapshot [`PostingList::len`] once and
//! read `[0, len)`; everything below a snapshot is immutable.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

// ------------------------------------------------------------------------------------------------
// Gram packing
// ------------------------------------------------------------------------------------------------

/// Fixed n-gram width. Values shorter than this publish no index entries,
/// and queries shorter than this cannot be answered.
pub const GRAM_N: usize = 3;

/// Address width of a packed gram.
const GRAM_BITS: usize = 8 * GRAM_N;

/// Packs the first [`GRAM_N`] bytes of `bytes` into a big-endian integer.
#[inline]
pub fn pack_gram(bytes: &[u8]) -> u32 {
    debug_assert!(bytes.len() >= GRAM_N);
    let mut packed = 0u32;
    for &b in &bytes[..GRAM_N] {
        packed = (packed << 8) | u32::from(b);
    }
    packed
}

// ------------------------------------------------------------------------------------------------
// PostingList
// ------------------------------------------------------------------------------------------------

/// Slots in the first chunk; chunk `k` holds `CHUNK_BASE << k` slots.
const CHUNK_BASE: usize = 16;
const CHUNK_BASE_BITS: u32 = CHUNK_BASE.trailing_zeros();

/// 28 exponentially growing chunks cover the full `u32` offset space.
const NUM_CHUNKS: usize = 28;

/// Append-only list of byte offsets for one gram.
pub struct PostingList {
    /// Chunk directory; chunk `k` holds `CHUNK_BASE << k` entries.
    chunks: [AtomicPtr<AtomicU32>; NUM_CHUNKS],

    /// Reserved slots (miniature write tail).
    write_len: AtomicUsize,

    /// Published prefix length (miniature read tail).
    read_len: AtomicUsize,
}

unsafe impl Send for PostingList {}
unsafe impl Sync for PostingList {}

/// Locates logical position `pos`: which chunk, which slot within it.
#[inline]
fn chunk_of(pos: usize) -> (usize, usize) {
    let bucket = (usize::BITS - 1 - ((pos >> CHUNK_BASE_BITS) + 1).leading_zeros()) as usize;
    let slot = pos - (CHUNK_BASE * ((1 << bucket) - 1));
    (bucket, slot)
}

impl PostingList {
    /// Creates an empty posting list.
    pub fn new() -> Self {
        Self {
            chunks: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            write_len: AtomicUsize::new(0),
            read_len: AtomicUsize::new(0),
        }
    }

    /// Appends `offset` and publishes it in reservation order.
    pub fn append(&self, offset: u32) {
        let pos = self.write_len.fetch_add(1, Ordering::SeqCst);
        let cell = self.ensure_cell(pos);
        cell.store(offset, Ordering::Release);

        // Publish: the committed length advances strictly in reservation
        // order, so a reader's len() snapshot always covers a fully
        // written prefix.
        while self
            .read_len
            .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    /// Number of published entries. Entries `[0, len)` are immutable and
    /// safe to read.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_len.load(Ordering::Acquire)
    }

    /// True if no entry has been published yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the entry at `pos`, which must be below a previously
    /// snapshotted [`PostingList::len`].
    #[inline]
    pub fn get(&self, pos: usize) -> u32 {
        let (bucket, slot) = chunk_of(pos);
        let chunk = self.chunks[bucket].load(Ordering::Acquire);
        debug_assert!(!chunk.is_null(), "read past published prefix");
        unsafe { &*chunk.add(slot) }.load(Ordering::Acquire)
    }

    /// Returns the cell for position `pos`, allocating its chunk on first
    /// touch.
    fn ensure_cell(&self, pos: usize) -> &AtomicU32 {
        let (bucket, slot) = chunk_of(pos);
        let cap = CHUNK_BASE << bucket;

        let mut chunk = self.chunks[bucket].load(Ordering::Acquire);
        if chunk.is_null() {
            let fresh: Box<[AtomicU32]> = (0..cap).map(|_| AtomicU32::new(0)).collect();
            let fresh = Box::into_raw(fresh) as *mut AtomicU32;
            chunk = match self.chunks[bucket].compare_exchange(
                ptr::null_mut(),
                fresh,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => fresh,
                Err(existing) => {
                    unsafe {
                        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(fresh, cap)));
                    }
                    existing
                }
            };
        }
        unsafe { &*chunk.add(slot) }
    }
}

impl Default for PostingList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PostingList {
    fn drop(&mut self) {
        for (bucket, slot) in self.chunks.iter().enumerate() {
            let p = slot.load(Ordering::Acquire);
            if !p.is_null() {
                let cap = CHUNK_BASE << bucket;
                unsafe {
                    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(p, cap)));
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// GramIndex
// ------------------------------------------------------------------------------------------------

/// High bits of a packed gram select the root page entry.
const ROOT_BITS: usize = 12;
const LEAF_BITS: usize = GRAM_BITS - ROOT_BITS;
const ROOT_LEN: usize = 1 << ROOT_BITS;
const LEAF_LEN: usize = 1 << LEAF_BITS;

/// Lock-free mapping from packed gram to [`PostingList`].
///
/// Two-level radix table over the packed gram; pages and lists are
/// allocated on first use and never freed before drop, so list references
/// returned to readers remain valid for the index's lifetime.
pub struct GramIndex {
    /// Root page; each entry points to a leaf page of `LEAF_LEN` list
    /// pointers, or null if no gram under it was ever published.
    roots: Box<[AtomicPtr<AtomicPtr<PostingList>>]>,
}

unsafe impl Send for GramIndex {}
unsafe impl Sync for GramIndex {}

impl GramIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        let roots = (0..ROOT_LEN)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self { roots }
    }

    /// Appends `offset` to the posting list of `gram`, creating the list
    /// on first use.
    pub fn append(&self, gram: u32, offset: u32) {
        debug_assert!(gram < (1 << GRAM_BITS) as u32);
        let leaf = self.ensure_leaf((gram as usize) >> LEAF_BITS);
        let cell = unsafe { &*leaf.add(gram as usize & (LEAF_LEN - 1)) };

        let mut list = cell.load(Ordering::Acquire);
        if list.is_null() {
            let fresh = Box::into_raw(Box::new(PostingList::new()));
            list = match cell.compare_exchange(
                ptr::null_mut(),
                fresh,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => fresh,
                Err(existing) => {
                    unsafe {
                        drop(Box::from_raw(fresh));
                    }
                    existing
                }
            };
        }
        unsafe { &*list }.append(offset);
    }

    /// Looks up the posting list of `gram`, if any entry was ever
    /// published for it.
    pub fn get(&self, gram: u32) -> Option<&PostingList> {
        debug_assert!(gram < (1 << GRAM_BITS) as u32);
        let leaf = self.roots[(gram as usize) >> LEAF_BITS].load(Ordering::Acquire);
        if leaf.is_null() {
            return None;
        }
        let list = unsafe { &*leaf.add(gram as usize & (LEAF_LEN - 1)) }.load(Ordering::Acquire);
        if list.is_null() {
            return None;
        }
        Some(unsafe { &*list })
    }

    /// Number of published entries for `gram`; zero if the gram was never
    /// seen.
    pub fn posting_len(&self, gram: u32) -> usize {
        self.get(gram).map_or(0, PostingList::len)
    }

    /// Returns the leaf page for a root slot, allocating it on first
    /// touch.
    fn ensure_leaf(&self, root_idx: usize) -> *mut AtomicPtr<PostingList> {
        let current = self.roots[root_idx].load(Ordering::Acquire);
        if !current.is_null() {
            return current;
        }

        let fresh: Box<[AtomicPtr<PostingList>]> = (0..LEAF_LEN)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let fresh = Box::into_raw(fresh) as *mut AtomicPtr<PostingList>;
        match self.roots[root_idx].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(existing) => {
                unsafe {
                    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(fresh, LEAF_LEN)));
                }
                existing
            }
        }
    }
}

impl Default for GramIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GramIndex {
    fn drop(&mut self) {
        for root in self.roots.iter() {
            let leaf = root.load(Ordering::Acquire);
            if leaf.is_null() {
                continue;
            }
            for i in 0..LEAF_LEN {
                let list = unsafe { &*leaf.add(i) }.load(Ordering::Acquire);
                if !list.is_null() {
                    unsafe {
                        drop(Box::from_raw(list));
                    }
                }
            }
            unsafe {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(leaf, LEAF_LEN)));
            }
        }
    }
}
