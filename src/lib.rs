//! tarndb - the storage-engine core of a disk-oriented relational database.
//!
//! The crate mediates between on-disk pages and in-memory access, and
//! indexes data by key:
//!
//! - **Buffer pool** (`buffer`): a fixed set of page frames with pin
//!   counts, per-frame reader/writer latches, and LRU-K victim selection
//!   (`BufferPoolManager`, `Frame`, `LruKReplacer`).
//! - **Extendible hash table** (`container`): the buffer pool's page table,
//!   reusable for any K -> V mapping; buckets split and the directory
//!   doubles under load.
//! - **B+tree index** (`index`): a concurrent ordered index over fixed-width
//!   keys with latch crabbing, node splits/merges, and leaf-chain iteration.
//! - **Page formats** (`storage::page`): byte-level views over 4 KB pages;
//!   `storage::disk` holds the file-backed page I/O.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tarndb::buffer::BufferPoolManager;
//! use tarndb::index::{BPlusTree, GenericKey, IntegerComparator};
//! use tarndb::storage::disk::DiskManager;
//! use tarndb::{PageId, Rid};
//!
//! let disk = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk));
//!
//! let tree = BPlusTree::<8, _>::new("demo_index", bpm, IntegerComparator, 32, 32);
//! let key = GenericKey::from_integer(42);
//! tree.insert(&key, Rid::new(PageId::new(7), 0), None).unwrap();
//! assert!(tree.get_value(&key, None).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod container;
pub mod index;
pub mod storage;

pub use common::{PageId, Result, Rid, StorageError};
