//! # gramlog
//!
//! An embeddable, **lock-free**, in-memory key-value store built on an
//! **append-only log** with built-in substring search. Designed for high
//! write throughput under arbitrary numbers of concurrent writers and
//! readers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       LogStore                           │
//! │                                                          │
//! │   append / update          get / search / col_search     │
//! │        │                            │                    │
//! │        ▼                            ▼                    │
//! │  ┌───────────┐   claim      ┌──────────────┐             │
//! │  │   Tail    │◄─────────────│  snapshot of │             │
//! │  │  W  │  R  │   commit     │  read tail   │             │
//! │  └─────┬─────┘              └──────┬───────┘             │
//! │        │ exclusive (key, range)    │ committed prefix    │
//! │        ▼                            ▼                    │
//! │  ┌──────────┐  ┌───────────────┐  ┌──────────────────┐   │
//! │  │ ByteLog  │  │ Offset/Delete │  │   GramIndex      │   │
//! │  │ (values) │  │    tables     │  │ (posting lists)  │   │
//! │  └──────────┘  └───────────────┘  └──────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │  Aggregate — per-thread versioned chains for derived     │
//! │  numeric statistics (sum / min / max / count)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | Core store façade — append, get, search, delete, update, stats |
//! | [`tail`] | Packed dual-counter tail words and the claim/commit protocol |
//! | [`log`] | Segmented byte log and dense offset / delete tables |
//! | [`index`] | N-gram index with append-only posting lists |
//! | [`aggregate`] | Lock-free multi-version numeric aggregates |
//!
//! ## Key Features
//!
//! - **Single fetch-and-add writes** — one atomic claim grants a writer both
//!   a unique internal key and an exclusive byte range in the log.
//! - **Ordered commits** — commits retire in claim order, so a snapshot of
//!   the read tail is always a consistent prefix of the store.
//! - **Substring search** — every appended value is indexed by its n-grams;
//!   queries scan the shorter of the prefix/suffix posting lists and verify
//!   candidates against the log itself.
//! - **Tombstone deletes** — deletion marks a key without touching the log;
//!   stale index entries are filtered at query time.
//! - **Versioned aggregates** — per-thread immutable chains give wait-free
//!   snapshot reads of running statistics at any version.
//!
//! ## Quick Start
//!
//! ```rust
//! use gramlog::{LogStore, StoreConfig};
//!
//! let store = LogStore::new(StoreConfig::default()).unwrap();
//!
//! // Append
//! let k0 = store.append(b"banana").unwrap();
//! let k1 = store.append(b"bandana").unwrap();
//!
//! // Point lookup
//! assert_eq!(store.get(k0), Some(b"banana".to_vec()));
//!
//! // Substring search
//! let hits = store.search(b"ana");
//! assert!(hits.contains(&k0) && hits.contains(&k1));
//!
//! // Delete
//! assert!(store.delete(k0).unwrap());
//! assert_eq!(store.get(k0), None);
//!
//! // Update = logical delete + append
//! let k2 = store.update(k1, b"orange").unwrap();
//! assert_eq!(store.get(k2), Some(b"orange".to_vec()));
//! ```

#![allow(dead_code)]

pub mod aggregate;
pub mod index;
pub mod log;
pub mod store;
pub mod tail;

pub use index::GRAM_N;
pub use store::{LogStore, StoreConfig, StoreError, StoreStats};
