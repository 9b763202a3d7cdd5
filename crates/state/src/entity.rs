//! Primary record storage and the generic indexed entity.
//!
//! [`Record`] ties a record type to its primary key family. The free
//! functions here read and write primary records inside a transaction;
//! [`IndexedEntity`] adds uniform CRUD and index lookups for record types
//! whose indexes are fully described by an [`IndexSet`] (users, sessions,
//! collection shares).

use std::collections::VecDeque;

use folio_types::config::RetryConfig;
use folio_types::{
    Book, Collection, CollectionShare, Contributor, Library, Series, Session, Tag, User, decode,
    encode,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::engine::{KvRead, StorageEngine, WriteTxn};
use crate::error::{AlreadyExistsSnafu, Result, StoreError, ensure_active};
use crate::index::IndexSet;
use crate::keys::{EntityType, parse_primary_key, primary_key, primary_prefix};
use crate::retry::with_write_retry;

/// A record stored under a primary key.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key family.
    const ENTITY: EntityType;

    /// Unique identifier within the family.
    fn id(&self) -> &str;

    /// Whether the record is tombstoned.
    fn is_deleted(&self) -> bool {
        false
    }
}

macro_rules! record {
    ($ty:ty, $entity:expr) => {
        impl Record for $ty {
            const ENTITY: EntityType = $entity;
            fn id(&self) -> &str {
                &self.id
            }
        }
    };
    ($ty:ty, $entity:expr, tombstoned) => {
        impl Record for $ty {
            const ENTITY: EntityType = $entity;
            fn id(&self) -> &str {
                &self.id
            }
            fn is_deleted(&self) -> bool {
                self.deleted_at.is_some()
            }
        }
    };
}

record!(Book, EntityType::Book, tombstoned);
record!(Contributor, EntityType::Contributor, tombstoned);
record!(Series, EntityType::Series, tombstoned);
record!(Collection, EntityType::Collection, tombstoned);
record!(CollectionShare, EntityType::Share);
record!(User, EntityType::User);
record!(Session, EntityType::Session);
record!(Tag, EntityType::Tag);
record!(Library, EntityType::Library);

// ============================================================================
// Primary record access
// ============================================================================

/// Reads a record, tombstoned or not.
pub(crate) fn load<T: Record, R: KvRead>(txn: &R, id: &str) -> Result<Option<T>> {
    match txn.get(&primary_key(T::ENTITY, id))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Reads a live record; tombstoned records read as absent.
pub(crate) fn load_live<T: Record, R: KvRead>(txn: &R, id: &str) -> Result<Option<T>> {
    Ok(load::<T, R>(txn, id)?.filter(|r| !r.is_deleted()))
}

/// Reads a live record or fails with [`StoreError::NotFound`].
pub(crate) fn require<T: Record, R: KvRead>(txn: &R, id: &str) -> Result<T> {
    load_live(txn, id)?.ok_or_else(|| StoreError::not_found(T::ENTITY, id))
}

/// Writes a record under its primary key.
pub(crate) fn save<T: Record>(txn: &mut WriteTxn, record: &T) -> Result<()> {
    txn.put(&primary_key(T::ENTITY, record.id()), &encode(record)?)?;
    Ok(())
}

/// Removes a record's primary key. Returns whether it was present.
pub(crate) fn remove<T: Record>(txn: &mut WriteTxn, id: &str) -> Result<bool> {
    Ok(txn.delete(&primary_key(T::ENTITY, id))?)
}

/// Fails with [`StoreError::AlreadyExists`] if `id` is taken, tombstoned
/// records included.
pub(crate) fn ensure_absent<T: Record>(txn: &WriteTxn, id: &str) -> Result<()> {
    if txn.exists(&primary_key(T::ENTITY, id))? {
        return AlreadyExistsSnafu { entity: T::ENTITY, id }.fail();
    }
    Ok(())
}

/// Batch-fetches live records in the order of `ids`, skipping missing and
/// tombstoned ones.
pub(crate) fn fetch_live<T, R, S>(txn: &R, ids: &[S], cancel: &CancellationToken) -> Result<Vec<T>>
where
    T: Record,
    R: KvRead,
    S: AsRef<str>,
{
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        ensure_active(cancel)?;
        if let Some(record) = load_live(txn, id.as_ref())? {
            records.push(record);
        }
    }
    Ok(records)
}

// ============================================================================
// Lazy listing
// ============================================================================

/// Records fetched per snapshot while listing.
const LIST_CHUNK: usize = 256;

/// Lazy iterator over every live record of a type, in key order.
///
/// Each chunk is read from a fresh snapshot, so a long listing never pins
/// one read transaction. Cancellation is checked before every item; once an
/// error is yielded the iterator is exhausted.
pub struct EntityIter<T> {
    engine: StorageEngine,
    cancel: CancellationToken,
    prefix: Vec<u8>,
    next_start: Option<Vec<u8>>,
    buffer: VecDeque<T>,
}

impl<T: Record> EntityIter<T> {
    pub(crate) fn new(engine: StorageEngine, cancel: &CancellationToken) -> Self {
        let prefix = primary_prefix(T::ENTITY);
        Self {
            engine,
            cancel: cancel.clone(),
            next_start: Some(prefix.clone()),
            prefix,
            buffer: VecDeque::new(),
        }
    }

    fn fill(&mut self) -> Result<()> {
        while self.buffer.is_empty() {
            let Some(start) = self.next_start.take() else {
                return Ok(());
            };
            let txn = self.engine.read()?;
            let entries = txn.scan_from(&self.prefix, &start, LIST_CHUNK)?;
            if entries.len() == LIST_CHUNK {
                if let Some((last, _)) = entries.last() {
                    let mut next = last.clone();
                    next.push(0);
                    self.next_start = Some(next);
                }
            }
            for (key, value) in entries {
                ensure_active(&self.cancel)?;
                if parse_primary_key(T::ENTITY, &key).is_none() {
                    continue;
                }
                let record: T = decode(&value)?;
                if !record.is_deleted() {
                    self.buffer.push_back(record);
                }
            }
        }
        Ok(())
    }
}

impl<T: Record> Iterator for EntityIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = ensure_active(&self.cancel).and_then(|()| self.fill()) {
            self.next_start = None;
            self.buffer.clear();
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}

// ============================================================================
// Generic indexed entity
// ============================================================================

/// Uniform CRUD and index lookups for one record type.
///
/// Records are hard deleted. Every mutation writes the primary record and
/// all its index entries in one write transaction.
pub struct IndexedEntity<T: Record> {
    engine: StorageEngine,
    indexes: IndexSet<T>,
    retry: RetryConfig,
}

impl<T: Record> IndexedEntity<T> {
    /// Creates an entity store over `engine` with the given index set.
    pub fn new(engine: StorageEngine, indexes: IndexSet<T>, retry: RetryConfig) -> Self {
        Self { engine, indexes, retry }
    }

    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the ID is taken, or
    /// [`StoreError::Conflict`] if a unique index value is claimed by another
    /// record.
    pub fn create(&self, record: &T) -> Result<()> {
        with_write_retry(&self.retry, "entity.create", || {
            let mut txn = self.engine.write()?;
            self.create_in(&mut txn, record)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// [`create`](Self::create) inside an existing transaction.
    pub(crate) fn create_in(&self, txn: &mut WriteTxn, record: &T) -> Result<()> {
        ensure_absent::<T>(txn, record.id())?;
        self.indexes.apply(txn, record.id(), None, Some(record))?;
        save(txn, record)
    }

    /// Returns a record by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record is absent.
    pub fn get(&self, id: &str) -> Result<T> {
        require(&self.engine.read()?, id)
    }

    /// Replaces a record, moving its index entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record is absent, or
    /// [`StoreError::Conflict`] on a unique index collision.
    pub fn update(&self, record: &T) -> Result<()> {
        with_write_retry(&self.retry, "entity.update", || {
            let mut txn = self.engine.write()?;
            let old: T = require(&txn, record.id())?;
            self.indexes.apply(&mut txn, record.id(), Some(&old), Some(record))?;
            save(&mut txn, record)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// Removes a record and its index entries. Absent records are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete(&self, id: &str) -> Result<()> {
        with_write_retry(&self.retry, "entity.delete", || {
            let mut txn = self.engine.write()?;
            self.delete_in(&mut txn, id)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// [`delete`](Self::delete) inside an existing transaction. Returns the
    /// removed record.
    pub(crate) fn delete_in(&self, txn: &mut WriteTxn, id: &str) -> Result<Option<T>> {
        let Some(old) = load::<T, _>(&*txn, id)? else {
            return Ok(None);
        };
        self.indexes.apply(txn, id, Some(&old), None)?;
        remove::<T>(txn, id)?;
        Ok(Some(old))
    }

    /// Lazily lists every record in key order.
    pub fn list(&self, cancel: &CancellationToken) -> EntityIter<T> {
        EntityIter::new(self.engine.clone(), cancel)
    }

    /// Returns every record whose `index` holds `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an undeclared index.
    pub fn find_by(&self, index: &str, value: &str) -> Result<Vec<T>> {
        let txn = self.engine.read()?;
        self.find_by_in(&txn, index, value)
    }

    pub(crate) fn find_by_in<R: KvRead>(&self, txn: &R, index: &str, value: &str) -> Result<Vec<T>> {
        let ids = self.indexes.lookup(txn, index, value)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(record) = load_live(txn, id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Returns the single record whose `index` holds `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record matches.
    pub fn find_one_by(&self, index: &str, value: &str) -> Result<T> {
        self.find_by(index, value)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(T::ENTITY, value))
    }
}
