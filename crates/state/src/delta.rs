//! Delta sync index.
//!
//! Every write to a syncable record (books, contributors, series,
//! collections) moves its entry in the updated-at index; a soft delete adds
//! an entry to the deleted-at index and leaves the updated-at entry alone.
//! "Changed since T" then costs a seek plus a walk over the changed
//! records, never a scan of the whole type.
//!
//! Thresholds are inclusive: a record written at `t` is returned for every
//! threshold `<= t`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use folio_types::{Book, Collection, Contributor, Series};
use tokio_util::sync::CancellationToken;

use crate::engine::{KvRead, WriteTxn};
use crate::entity::{Record, fetch_live, save};
use crate::error::{Result, ensure_active};
use crate::keys::{DeltaKeys, EntityType, decode_timestamp_key, timestamp_key, timestamp_seek_key};
use crate::store::Store;

/// Delta entries read per scan step.
const DELTA_CHUNK: usize = 512;

/// A tombstoned record type tracked by the delta index.
pub(crate) trait Synced: Record {
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    fn set_deleted_at(&mut self, at: DateTime<Utc>);
    fn clear_deleted_at(&mut self);
    fn created_at(&self) -> DateTime<Utc>;
    fn set_created_at(&mut self, at: DateTime<Utc>);
}

macro_rules! synced {
    ($($ty:ty),+) => {
        $(impl Synced for $ty {
            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
            fn set_updated_at(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
            fn set_deleted_at(&mut self, at: DateTime<Utc>) {
                self.deleted_at = Some(at);
            }
            fn clear_deleted_at(&mut self) {
                self.deleted_at = None;
            }
            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
            fn set_created_at(&mut self, at: DateTime<Utc>) {
                self.created_at = at;
            }
        })+
    };
}

synced!(Book, Contributor, Series, Collection);

/// Writes `record` stamped at `at` and moves its updated-at entry from
/// `previous`, the timestamp currently indexed (`None` for a new record).
pub(crate) fn save_synced<T: Synced>(
    txn: &mut WriteTxn,
    record: &mut T,
    previous: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> Result<()> {
    record.set_updated_at(at);
    save(txn, record)?;
    record_updated(txn, T::ENTITY, record.id(), previous, at)
}

/// Re-stamps a stored record without any other change.
pub(crate) fn touch_synced<T: Synced>(txn: &mut WriteTxn, record: &mut T, at: DateTime<Utc>) -> Result<()> {
    let previous = record.updated_at();
    save_synced(txn, record, Some(previous), at)
}

/// Tombstones a stored record and adds its deleted-at entry.
pub(crate) fn tombstone_synced<T: Synced>(txn: &mut WriteTxn, record: &mut T, at: DateTime<Utc>) -> Result<()> {
    record.set_deleted_at(at);
    touch_synced(txn, record, at)?;
    record_deleted(txn, T::ENTITY, record.id(), at)
}

/// Moves a record's updated-at entry from `previous` to `at`.
pub(crate) fn record_updated(
    txn: &mut WriteTxn,
    entity: EntityType,
    id: &str,
    previous: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> Result<()> {
    let prefix = DeltaKeys::updated(entity);
    if let Some(previous) = previous.filter(|p| *p != at) {
        txn.delete(&timestamp_key(&prefix, previous, entity, id))?;
    }
    txn.put(&timestamp_key(&prefix, at, entity, id), &[])?;
    Ok(())
}

/// Adds a deleted-at entry for a record tombstoned at `at`.
pub(crate) fn record_deleted(txn: &mut WriteTxn, entity: EntityType, id: &str, at: DateTime<Utc>) -> Result<()> {
    txn.put(&timestamp_key(&DeltaKeys::deleted(entity), at, entity, id), &[])?;
    Ok(())
}

/// IDs with an entry under `prefix` at or after `after`, in chronological
/// order, each at most once.
pub(crate) fn changed_ids<R: KvRead>(
    txn: &R,
    prefix: &[u8],
    entity: EntityType,
    after: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    ensure_active(cancel)?;
    let mut start = timestamp_seek_key(prefix, after);
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    loop {
        let entries = txn.scan_from(prefix, &start, DELTA_CHUNK)?;
        for (key, _) in &entries {
            ensure_active(cancel)?;
            let Some(decoded) = decode_timestamp_key(prefix, key) else {
                tracing::warn!(entity = %entity, "Skipping undecodable delta entry");
                continue;
            };
            if decoded.entity_type == entity && seen.insert(decoded.entity_id.clone()) {
                ids.push(decoded.entity_id);
            }
        }
        match entries.last() {
            Some((last, _)) if entries.len() == DELTA_CHUNK => {
                start = last.clone();
                start.push(0);
            },
            _ => break,
        }
    }
    Ok(ids)
}

impl Store {
    fn updated_after<T: Record>(&self, after: DateTime<Utc>, cancel: &CancellationToken) -> Result<Vec<T>> {
        let txn = self.read()?;
        let ids = changed_ids(&txn, &DeltaKeys::updated(T::ENTITY), T::ENTITY, after, cancel)?;
        fetch_live(&txn, &ids, cancel)
    }

    fn deleted_after(
        &self,
        entity: EntityType,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let txn = self.read()?;
        changed_ids(&txn, &DeltaKeys::deleted(entity), entity, after, cancel)
    }

    /// Live books written at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`](crate::StoreError::Cancelled) if
    /// `cancel` fires, or an engine or codec error.
    pub fn books_updated_after(&self, after: DateTime<Utc>, cancel: &CancellationToken) -> Result<Vec<Book>> {
        self.updated_after(after, cancel)
    }

    /// IDs of books soft-deleted at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`](crate::StoreError::Cancelled) if
    /// `cancel` fires, or an engine error.
    pub fn books_deleted_after(&self, after: DateTime<Utc>, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.deleted_after(EntityType::Book, after, cancel)
    }

    /// Live contributors written at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn contributors_updated_after(
        &self,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Contributor>> {
        self.updated_after(after, cancel)
    }

    /// IDs of contributors soft-deleted at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn contributors_deleted_after(
        &self,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.deleted_after(EntityType::Contributor, after, cancel)
    }

    /// Live series written at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn series_updated_after(&self, after: DateTime<Utc>, cancel: &CancellationToken) -> Result<Vec<Series>> {
        self.updated_after(after, cancel)
    }

    /// IDs of series soft-deleted at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn series_deleted_after(&self, after: DateTime<Utc>, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.deleted_after(EntityType::Series, after, cancel)
    }

    /// Live collections written at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn collections_updated_after(
        &self,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Collection>> {
        self.updated_after(after, cancel)
    }

    /// IDs of collections soft-deleted at or after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn collections_deleted_after(
        &self,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.deleted_after(EntityType::Collection, after, cancel)
    }

    /// Books written at or after `after` that `user_id` may see.
    ///
    /// Each candidate from the updated-at index passes through the same
    /// decision as [`Store::can_user_access_book`], inbox exclusion
    /// included, so the cost follows the number of changed books.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn books_updated_after_for_user(
        &self,
        user_id: &str,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Book>> {
        let txn = self.read()?;
        let ids = changed_ids(&txn, &DeltaKeys::updated(EntityType::Book), EntityType::Book, after, cancel)?;
        let books: Vec<Book> = fetch_live(&txn, &ids, cancel)?;
        let mut contexts = crate::access::ContextCache::new(user_id);
        let mut visible = Vec::with_capacity(books.len());
        for book in books {
            ensure_active(cancel)?;
            let ctx = contexts.get(self, &txn, &book.library_id)?;
            if self.book_visible_in(&txn, ctx, &book.id)? {
                visible.push(book);
            }
        }
        Ok(visible)
    }
}
