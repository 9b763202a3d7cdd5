//! Persistence and access-control core for the Folio audiobook library.
//!
//! This crate sits on an embedded ordered key-value engine (`redb`) and
//! provides:
//!
//! - Typed key builders for primary records, secondary indexes, mirrored
//!   relationship edges and timestamp-ordered delta entries
//! - Declarative secondary indexes kept in step with their records inside
//!   each write transaction
//! - Cursor pagination over key ranges and stored sequences
//! - Delta sync ("changed since T") without full scans
//! - Book and collection visibility under open and restricted libraries,
//!   inbox staging and global-access collections
//! - Merging and unmerging of duplicate contributors and series
//! - Buffered bulk writes for library scans
//! - A notifier port for post-commit side effects (search, events,
//!   transcode cleanup)

#![deny(unsafe_code)]

mod access;
mod batch;
mod cache;
mod delta;
pub mod diff;
pub mod edges;
mod engine;
mod entity;
mod error;
mod index;
pub mod keys;
mod merge;
pub mod notify;
pub mod pagination;
mod retry;
mod store;

pub use access::{AccessContext, CollectionAccess};
pub use batch::{BatchItem, BatchWriter};
pub use cache::LibraryCache;
pub use engine::{EngineError, Entry, KvRead, ReadTxn, StorageEngine, WriteTxn};
pub use entity::{EntityIter, IndexedEntity, Record};
pub use error::{Result, StoreError};
pub use index::{IndexDef, IndexSet};
pub use keys::EntityType;
pub use notify::{Notifier, StoreEvent};
pub use pagination::{Page, PageParams};
pub use store::Store;
