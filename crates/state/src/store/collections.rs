//! Collection operations.
//!
//! A collection's `book_ids` sequence and its book edges always change
//! together. Every membership change also refreshes the book's uncollected
//! marker and moves the book's updated-at entry, because visibility may
//! have changed with it.

use chrono::{DateTime, Utc};
use folio_types::{Book, Collection};
use tokio_util::sync::CancellationToken;

use super::Store;
use super::books::refresh_uncollected;
use crate::delta::{save_synced, tombstone_synced, touch_synced};
use crate::diff::diff_string_set;
use crate::edges::{BOOK_COLLECTION, add_edge, clear_edges, targets};
use crate::engine::{KvRead, WriteTxn};
use crate::entity::{ensure_absent, fetch_live, load_live, require};
use crate::error::{ConflictSnafu, Result, StoreError};
use crate::keys::{CollectionKeys, trailing_component};
use crate::pagination::{Page, PageParams, paginate_sequence};

/// Order-preserving dedup of member IDs.
fn dedup_members(book_ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    book_ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

impl Store {
    /// The live inbox collection of `library_id`, if any.
    pub(crate) fn inbox_id_in<R: KvRead>(&self, txn: &R, library_id: &str) -> Result<Option<String>> {
        let Some(value) = txn.get(&CollectionKeys::inbox(library_id))? else {
            return Ok(None);
        };
        let Ok(id) = String::from_utf8(value) else {
            tracing::warn!(library_id, "Ignoring undecodable inbox pointer");
            return Ok(None);
        };
        Ok(load_live::<Collection, _>(txn, &id)?.map(|c| c.id))
    }

    fn claim_inbox(&self, txn: &mut WriteTxn, collection: &Collection) -> Result<()> {
        if let Some(existing) = self.inbox_id_in(&*txn, &collection.library_id)? {
            if existing != collection.id {
                return ConflictSnafu { index: "inbox", value: collection.library_id.clone() }.fail();
            }
        }
        txn.put(&CollectionKeys::inbox(&collection.library_id), collection.id.as_bytes())?;
        Ok(())
    }

    fn release_inbox(&self, txn: &mut WriteTxn, collection: &Collection) -> Result<()> {
        let key = CollectionKeys::inbox(&collection.library_id);
        if txn.get(&key)?.as_deref() == Some(collection.id.as_bytes()) {
            txn.delete(&key)?;
        }
        Ok(())
    }

    /// Links books to a collection. Every book must be live and belong to
    /// the collection's library.
    fn link_books(&self, txn: &mut WriteTxn, collection: &Collection, book_ids: &[String], now: DateTime<Utc>) -> Result<()> {
        for book_id in book_ids {
            let mut book: Book = require(&*txn, book_id)?;
            if book.library_id != collection.library_id {
                return Err(StoreError::invalid(format!(
                    "book {book_id} belongs to library {}, not {}",
                    book.library_id, collection.library_id
                )));
            }
            add_edge(txn, BOOK_COLLECTION, book_id, &collection.id)?;
            refresh_uncollected(txn, &book)?;
            touch_synced(txn, &mut book, now)?;
        }
        Ok(())
    }

    fn unlink_books(&self, txn: &mut WriteTxn, collection_id: &str, book_ids: &[String], now: DateTime<Utc>) -> Result<()> {
        for book_id in book_ids {
            self.unlink_book_from_collection(txn, book_id, collection_id, now)?;
        }
        Ok(())
    }

    /// Stores a new collection and links its initial members.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the ID is taken,
    /// [`StoreError::NotFound`] if a member book is absent or deleted,
    /// [`StoreError::InvalidInput`] if a member belongs to another library,
    /// or [`StoreError::Conflict`] if the library already has an inbox.
    pub fn create_collection(&self, collection: &Collection) -> Result<Collection> {
        let stored = self.write("collection.create", |txn| {
            ensure_absent::<Collection>(txn, &collection.id)?;
            let now = self.now();
            let mut stored = collection.clone();
            stored.deleted_at = None;
            stored.book_ids = dedup_members(&stored.book_ids);
            if stored.is_inbox {
                self.claim_inbox(txn, &stored)?;
            }
            txn.put(&CollectionKeys::owner(&stored.owner_id, &stored.id), &[])?;
            self.link_books(txn, &stored, &stored.book_ids, now)?;
            save_synced(txn, &mut stored, None, now)?;
            Ok(stored)
        })?;
        self.notifier().collection_changed(stored.clone());
        Ok(stored)
    }

    /// Returns a live collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection is absent or
    /// deleted.
    pub fn get_collection(&self, id: &str) -> Result<Collection> {
        require(&self.read()?, id)
    }

    /// Replaces a collection, diffing its members, owner and inbox flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection or an added book is
    /// absent, [`StoreError::InvalidInput`] if the library changes or an
    /// added book belongs to another library, or [`StoreError::Conflict`]
    /// if it becomes a second inbox.
    pub fn update_collection(&self, collection: &Collection) -> Result<Collection> {
        let stored = self.write("collection.update", |txn| {
            let old: Collection = require(&*txn, &collection.id)?;
            if old.library_id != collection.library_id {
                return Err(StoreError::invalid("a collection cannot move between libraries"));
            }
            let now = self.now();
            let mut stored = collection.clone();
            stored.created_at = old.created_at;
            stored.deleted_at = None;
            stored.book_ids = dedup_members(&stored.book_ids);

            match (old.is_inbox, stored.is_inbox) {
                (false, true) => self.claim_inbox(txn, &stored)?,
                (true, false) => self.release_inbox(txn, &old)?,
                _ => {},
            }
            if old.owner_id != stored.owner_id {
                txn.delete(&CollectionKeys::owner(&old.owner_id, &old.id))?;
                txn.put(&CollectionKeys::owner(&stored.owner_id, &stored.id), &[])?;
            }

            let (added, removed) = diff_string_set(&old.book_ids, &stored.book_ids);
            self.unlink_books(txn, &stored.id, &removed, now)?;
            self.link_books(txn, &stored, &added, now)?;
            save_synced(txn, &mut stored, Some(old.updated_at), now)?;
            Ok(stored)
        })?;
        self.notifier().collection_changed(stored.clone());
        Ok(stored)
    }

    /// Soft-deletes a collection.
    ///
    /// Members are released (and become uncollected if this was their last
    /// collection), the owner entry, inbox pointer and every share are
    /// removed. Absent or already deleted collections are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_collection(&self, id: &str) -> Result<()> {
        let deleted = self.write("collection.delete", |txn| {
            let Some(mut collection) = load_live::<Collection, _>(&*txn, id)? else {
                return Ok(false);
            };
            let now = self.now();
            let members = clear_edges(txn, BOOK_COLLECTION.reversed(), id)?;
            for book_id in &members {
                if let Some(mut book) = load_live::<Book, _>(&*txn, book_id)? {
                    refresh_uncollected(txn, &book)?;
                    touch_synced(txn, &mut book, now)?;
                }
            }
            txn.delete(&CollectionKeys::owner(&collection.owner_id, id))?;
            if collection.is_inbox {
                self.release_inbox(txn, &collection)?;
            }
            for share in self.shares().find_by_in(&*txn, "collection", id)? {
                self.shares().delete_in(txn, &share.id)?;
            }
            collection.book_ids.clear();
            tombstone_synced(txn, &mut collection, now)?;
            Ok(true)
        })?;
        if deleted {
            self.notifier().collection_deleted(id);
        }
        Ok(())
    }

    /// Appends a live book to a collection. Existing members are left in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection or book is absent,
    /// or [`StoreError::InvalidInput`] if the book belongs to another
    /// library.
    pub fn add_book_to_collection(&self, collection_id: &str, book_id: &str) -> Result<Collection> {
        let (collection, changed) = self.write("collection.add_book", |txn| {
            let mut collection: Collection = require(&*txn, collection_id)?;
            if collection.book_ids.iter().any(|b| b == book_id) {
                return Ok((collection, false));
            }
            let now = self.now();
            self.link_books(txn, &collection, &[book_id.to_string()], now)?;
            collection.book_ids.push(book_id.to_string());
            touch_synced(txn, &mut collection, now)?;
            Ok((collection, true))
        })?;
        if changed {
            self.notifier().collection_changed(collection.clone());
        }
        Ok(collection)
    }

    /// Removes a book from a collection. Non-members are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection is absent.
    pub fn remove_book_from_collection(&self, collection_id: &str, book_id: &str) -> Result<Collection> {
        let (collection, changed) = self.write("collection.remove_book", |txn| {
            let mut collection: Collection = require(&*txn, collection_id)?;
            if !collection.book_ids.iter().any(|b| b == book_id) {
                return Ok((collection, false));
            }
            let now = self.now();
            collection.book_ids.retain(|b| b != book_id);
            self.unlink_book_from_collection(txn, book_id, collection_id, now)?;
            touch_synced(txn, &mut collection, now)?;
            Ok((collection, true))
        })?;
        if changed {
            self.notifier().collection_changed(collection.clone());
        }
        Ok(collection)
    }

    /// One page of a collection's live books in stored order.
    ///
    /// The cursor is a position in the member sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection is absent or
    /// [`StoreError::InvalidInput`] for a malformed cursor.
    pub fn collection_books(
        &self,
        collection_id: &str,
        params: &PageParams,
        cancel: &CancellationToken,
    ) -> Result<Page<Book>> {
        let txn = self.read()?;
        let collection: Collection = require(&txn, collection_id)?;
        let page = paginate_sequence(&collection.book_ids, params, &self.config().pagination)?;
        let items = fetch_live(&txn, &page.items, cancel)?;
        Ok(Page { items, has_more: page.has_more, next_cursor: page.next_cursor, total: page.total })
    }

    /// Live collections containing a book, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn collections_for_book(&self, book_id: &str) -> Result<Vec<Collection>> {
        let txn = self.read()?;
        let ids = targets(&txn, BOOK_COLLECTION, book_id)?;
        fetch_live(&txn, &ids, &CancellationToken::new())
    }

    /// The inbox collection of a library, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn library_inbox(&self, library_id: &str) -> Result<Option<Collection>> {
        let txn = self.read()?;
        match self.inbox_id_in(&txn, library_id)? {
            Some(id) => load_live(&txn, &id),
            None => Ok(None),
        }
    }

    /// Live collections owned by a user, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn owned_collections(&self, user_id: &str) -> Result<Vec<Collection>> {
        let txn = self.read()?;
        let prefix = CollectionKeys::owner_prefix(user_id);
        let ids: Vec<String> =
            txn.scan_prefix(&prefix)?.iter().filter_map(|(key, _)| trailing_component(key, &prefix)).collect();
        fetch_live(&txn, &ids, &CancellationToken::new())
    }
}
