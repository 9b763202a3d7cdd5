//! Book operations.
//!
//! A book owns the widest set of index families: the unique path, one
//! lookup per positive inode, the library edge, contributor, series, tag and
//! collection edges, the uncollected marker and both delta entries. Every
//! family is diffed against the stored book inside the same transaction as
//! the primary write.

use chrono::{DateTime, Utc};
use folio_types::{Book, BookContributor, BookSeries, Collection, Contributor, Series};
use tokio_util::sync::CancellationToken;

use super::Store;
use super::identity::sync_identity_edges;
use crate::delta::{save_synced, tombstone_synced, touch_synced};
use crate::diff::diff_u64_set;
use crate::edges::{BOOK_COLLECTION, BOOK_CONTRIBUTOR, BOOK_SERIES, BOOK_TAG, clear_edges, has_targets, remove_edge};
use crate::engine::{KvRead, WriteTxn};
use crate::entity::{ensure_absent, load_live, require};
use crate::error::{ConflictSnafu, Result, StoreError};
use crate::keys::{BookKeys, CollectionKeys, EntityType, primary_prefix, trailing_component};
use crate::pagination::{Page, PageParams, scan_page};

/// A committed book write and the identities it stopped referencing.
pub(crate) struct BookChange {
    pub(crate) book: Book,
    pub(crate) created: bool,
    pub(crate) dropped_contributors: Vec<String>,
    pub(crate) dropped_series: Vec<String>,
}

fn lookup_id<R: KvRead>(txn: &R, key: &[u8]) -> Result<Option<String>> {
    Ok(txn.get(key)?.and_then(|value| String::from_utf8(value).ok()))
}

/// Claims the unique path for `book_id`.
fn claim_path(txn: &mut WriteTxn, path: &str, book_id: &str) -> Result<()> {
    let key = BookKeys::path(path);
    if let Some(owner) = lookup_id(&*txn, &key)? {
        if owner != book_id {
            return ConflictSnafu { index: "path", value: path }.fail();
        }
    }
    txn.put(&key, book_id.as_bytes())?;
    Ok(())
}

/// Removes a lookup entry only while it still points at `book_id`.
fn release(txn: &mut WriteTxn, key: &[u8], book_id: &str) -> Result<()> {
    if lookup_id(&*txn, key)?.as_deref() == Some(book_id) {
        txn.delete(key)?;
    }
    Ok(())
}

/// Writes or clears the uncollected marker from the book's current
/// collection edges.
pub(crate) fn refresh_uncollected(txn: &mut WriteTxn, book: &Book) -> Result<()> {
    let key = BookKeys::uncollected(&book.library_id, &book.id);
    if book.is_deleted() || has_targets(&*txn, BOOK_COLLECTION, &book.id)? {
        txn.delete(&key)?;
    } else {
        txn.put(&key, &[])?;
    }
    Ok(())
}

impl Store {
    pub(crate) fn create_book_in(&self, txn: &mut WriteTxn, book: &Book, now: DateTime<Utc>) -> Result<BookChange> {
        ensure_absent::<Book>(txn, &book.id)?;
        let mut stored = book.clone();
        stored.deleted_at = None;

        claim_path(txn, &stored.path, &stored.id)?;
        let (inodes, _) = diff_u64_set(&[], &stored.inodes());
        for inode in inodes {
            txn.put(&BookKeys::inode(inode), stored.id.as_bytes())?;
        }
        txn.put(&CollectionKeys::library_book(&stored.library_id, &stored.id), &[])?;
        sync_identity_edges::<Contributor>(txn, &stored)?;
        sync_identity_edges::<Series>(txn, &stored)?;
        refresh_uncollected(txn, &stored)?;
        save_synced(txn, &mut stored, None, now)?;

        Ok(BookChange { book: stored, created: true, dropped_contributors: Vec::new(), dropped_series: Vec::new() })
    }

    pub(crate) fn update_book_in(&self, txn: &mut WriteTxn, book: &Book, now: DateTime<Utc>) -> Result<BookChange> {
        let old: Book = require(&*txn, &book.id)?;
        let mut stored = book.clone();
        stored.created_at = old.created_at;
        stored.deleted_at = None;

        if old.path != stored.path {
            release(txn, &BookKeys::path(&old.path), &old.id)?;
            claim_path(txn, &stored.path, &stored.id)?;
        }

        let (added, removed) = diff_u64_set(&old.inodes(), &stored.inodes());
        for inode in removed {
            release(txn, &BookKeys::inode(inode), &old.id)?;
        }
        for inode in added {
            txn.put(&BookKeys::inode(inode), stored.id.as_bytes())?;
        }

        if old.library_id != stored.library_id {
            if has_targets(&*txn, BOOK_COLLECTION, &old.id)? {
                return Err(StoreError::invalid(format!(
                    "book {} must leave its collections before moving to library {}",
                    old.id, stored.library_id
                )));
            }
            txn.delete(&CollectionKeys::library_book(&old.library_id, &old.id))?;
            txn.delete(&BookKeys::uncollected(&old.library_id, &old.id))?;
            txn.put(&CollectionKeys::library_book(&stored.library_id, &stored.id), &[])?;
        }

        let (_, dropped_contributors) = sync_identity_edges::<Contributor>(txn, &stored)?;
        let (_, dropped_series) = sync_identity_edges::<Series>(txn, &stored)?;
        refresh_uncollected(txn, &stored)?;
        save_synced(txn, &mut stored, Some(old.updated_at), now)?;

        Ok(BookChange { book: stored, created: false, dropped_contributors, dropped_series })
    }

    /// Dispatches side effects and orphan cleanup for committed book writes.
    pub(crate) fn finish_book_changes(&self, changes: Vec<BookChange>) {
        let mut contributors = Vec::new();
        let mut series = Vec::new();
        for change in changes {
            contributors.extend(change.dropped_contributors);
            series.extend(change.dropped_series);
            self.notifier().book_changed(change.book, change.created);
        }
        self.cleanup_orphans::<Contributor>(&contributors);
        self.cleanup_orphans::<Series>(&series);
    }

    fn commit_book_change<F>(&self, operation: &'static str, mut f: F) -> Result<Book>
    where
        F: FnMut(&mut WriteTxn, DateTime<Utc>) -> Result<BookChange>,
    {
        let change = self.write(operation, |txn| f(txn, self.now()))?;
        let book = change.book.clone();
        self.finish_book_changes(vec![change]);
        Ok(book)
    }

    /// Stores a new book and every index it participates in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the ID is taken (deleted
    /// books included) or [`StoreError::Conflict`] if a live book already
    /// holds the path.
    pub fn create_book(&self, book: &Book) -> Result<Book> {
        self.commit_book_change("book.create", |txn, now| self.create_book_in(txn, book, now))
    }

    /// Returns a live book.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book is absent or deleted.
    pub fn get_book(&self, id: &str) -> Result<Book> {
        require(&self.read()?, id)
    }

    /// Returns the live book scanned from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no live book holds the path.
    pub fn get_book_by_path(&self, path: &str) -> Result<Book> {
        self.book_by_lookup(&BookKeys::path(path), path)
    }

    /// Returns the live book owning an audio file with this inode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no live book claims the inode.
    pub fn get_book_by_inode(&self, inode: u64) -> Result<Book> {
        self.book_by_lookup(&BookKeys::inode(inode), &inode.to_string())
    }

    fn book_by_lookup(&self, key: &[u8], value: &str) -> Result<Book> {
        let txn = self.read()?;
        let Some(id) = lookup_id(&txn, key)? else {
            return Err(StoreError::not_found(EntityType::Book, value));
        };
        load_live(&txn, &id)?.ok_or_else(|| StoreError::not_found(EntityType::Book, value))
    }

    /// Replaces a book, moving only the index entries that changed.
    ///
    /// Contributors and series the book no longer references are
    /// soft-deleted afterwards if nothing else credits them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book is absent or deleted,
    /// [`StoreError::Conflict`] if the new path is taken, or
    /// [`StoreError::InvalidInput`] if it changes library while still a
    /// member of a collection.
    pub fn update_book(&self, book: &Book) -> Result<Book> {
        self.commit_book_change("book.update", |txn, now| self.update_book_in(txn, book, now))
    }

    /// Bumps a book's modification time without any other change.
    ///
    /// Rewrites the primary record and moves its updated-at entry; no
    /// relationship is diffed and no side effect is dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book is absent or deleted.
    pub fn touch_book(&self, id: &str) -> Result<Book> {
        self.write("book.touch", |txn| {
            let mut book: Book = require(&*txn, id)?;
            touch_synced(txn, &mut book, self.now())?;
            Ok(book)
        })
    }

    /// Replaces a book's contributor credits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book is absent or deleted.
    pub fn set_book_contributors(&self, book_id: &str, contributors: Vec<BookContributor>) -> Result<Book> {
        self.commit_book_change("book.set_contributors", |txn, now| {
            let mut book: Book = require(&*txn, book_id)?;
            book.contributors = contributors.clone();
            self.update_book_in(txn, &book, now)
        })
    }

    /// Replaces a book's series memberships.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book is absent or deleted.
    pub fn set_book_series(&self, book_id: &str, series: Vec<BookSeries>) -> Result<Book> {
        self.commit_book_change("book.set_series", |txn, now| {
            let mut book: Book = require(&*txn, book_id)?;
            book.series = series.clone();
            self.update_book_in(txn, &book, now)
        })
    }

    /// Soft-deletes a book.
    ///
    /// The book leaves every collection, loses its path, inode, library and
    /// relationship entries, and gains a deleted-at entry. Transcodes and
    /// the search document are removed after commit. Absent or already
    /// deleted books are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_book(&self, id: &str) -> Result<()> {
        let outcome = self.write("book.delete", |txn| {
            let Some(mut book) = load_live::<Book, _>(&*txn, id)? else {
                return Ok(None);
            };
            let now = self.now();

            let mut collections = Vec::new();
            for collection_id in clear_edges(txn, BOOK_COLLECTION, id)? {
                if let Some(mut collection) = load_live::<Collection, _>(&*txn, &collection_id)? {
                    collection.book_ids.retain(|b| b != id);
                    touch_synced(txn, &mut collection, now)?;
                    collections.push(collection);
                }
            }

            release(txn, &BookKeys::path(&book.path), id)?;
            for inode in book.inodes() {
                release(txn, &BookKeys::inode(inode), id)?;
            }
            txn.delete(&CollectionKeys::library_book(&book.library_id, id))?;
            let contributors = clear_edges(txn, BOOK_CONTRIBUTOR, id)?;
            let series = clear_edges(txn, BOOK_SERIES, id)?;
            clear_edges(txn, BOOK_TAG, id)?;

            tombstone_synced(txn, &mut book, now)?;
            refresh_uncollected(txn, &book)?;
            Ok(Some((collections, contributors, series)))
        })?;

        let Some((collections, contributors, series)) = outcome else {
            return Ok(());
        };
        tracing::debug!(book_id = %id, collections = collections.len(), "Book soft-deleted");
        self.notifier().book_deleted(id);
        for collection in collections {
            self.notifier().collection_changed(collection);
        }
        self.cleanup_orphans::<Contributor>(&contributors);
        self.cleanup_orphans::<Series>(&series);
        Ok(())
    }

    /// One page of live books in ID order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a malformed cursor or
    /// [`StoreError::Cancelled`] if `cancel` fires.
    pub fn list_books(&self, params: &PageParams, cancel: &CancellationToken) -> Result<Page<Book>> {
        let txn = self.read()?;
        scan_page(&txn, &primary_prefix(EntityType::Book), params, &self.config().pagination, cancel, |_, value| {
            let book: Book = folio_types::decode(value)?;
            Ok((!book.is_deleted()).then_some(book))
        })
    }

    /// One page of a library's live books in ID order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a malformed cursor or
    /// [`StoreError::Cancelled`] if `cancel` fires.
    pub fn library_books(
        &self,
        library_id: &str,
        params: &PageParams,
        cancel: &CancellationToken,
    ) -> Result<Page<Book>> {
        let txn = self.read()?;
        let prefix = CollectionKeys::library_book_prefix(library_id);
        scan_page(&txn, &prefix, params, &self.config().pagination, cancel, |key, _| {
            match trailing_component(key, &prefix) {
                Some(book_id) => load_live(&txn, &book_id),
                None => Ok(None),
            }
        })
    }

    /// Removes a book from a collection edge set and refreshes its marker.
    pub(crate) fn unlink_book_from_collection(
        &self,
        txn: &mut WriteTxn,
        book_id: &str,
        collection_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Book>> {
        remove_edge(txn, BOOK_COLLECTION, book_id, collection_id)?;
        let Some(mut book) = load_live::<Book, _>(&*txn, book_id)? else {
            return Ok(None);
        };
        refresh_uncollected(txn, &book)?;
        touch_synced(txn, &mut book, now)?;
        Ok(Some(book))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use folio_types::config::FolioConfig;
    use folio_types::{AudioFile, ContributorRole};

    use super::*;

    fn store() -> Store {
        Store::in_memory(FolioConfig::default()).expect("store")
    }

    fn book(store: &Store, id: &str, path: &str, inodes: &[u64]) -> Book {
        let mut book = Book::new(id, "lib", format!("Title {id}"), path, store.now());
        book.audio_files = inodes.iter().map(|i| AudioFile::new(*i, format!("{path}/{i}.mp3"))).collect();
        book
    }

    fn keys(store: &Store, prefix: &[u8]) -> Vec<String> {
        let txn = store.read().unwrap();
        txn.scan_prefix(prefix).unwrap().into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect()
    }

    #[test]
    fn test_create_indexes_path_inodes_and_marker() {
        let store = store();
        store.create_book(&book(&store, "b1", "/books/dune", &[11, 12, 0])).unwrap();

        assert_eq!(store.get_book_by_path("/books/dune").unwrap().id, "b1");
        assert_eq!(store.get_book_by_inode(11).unwrap().id, "b1");
        assert!(store.get_book_by_inode(0).is_err());
        assert_eq!(keys(&store, &BookKeys::uncollected_prefix("lib")).len(), 1);
        assert_eq!(keys(&store, &CollectionKeys::library_book_prefix("lib")).len(), 1);
    }

    #[test]
    fn test_duplicate_path_conflicts_until_deleted() {
        let store = store();
        store.create_book(&book(&store, "b1", "/same", &[])).unwrap();
        let err = store.create_book(&book(&store, "b2", "/same", &[])).expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict { ref index, .. } if index == "path"));

        store.delete_book("b1").unwrap();
        store.create_book(&book(&store, "b2", "/same", &[])).expect("path released");
        let err = store.create_book(&book(&store, "b1", "/other", &[])).expect_err("tombstone keeps id");
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn test_update_moves_inode_entries() {
        let store = store();
        store.create_book(&book(&store, "b1", "/p", &[1, 2, 3])).unwrap();
        store.update_book(&book(&store, "b1", "/p", &[2, 3, 4])).unwrap();

        assert!(store.get_book_by_inode(1).expect_err("removed").is_not_found());
        for inode in [2, 3, 4] {
            assert_eq!(store.get_book_by_inode(inode).unwrap().id, "b1");
        }
    }

    #[test]
    fn test_inode_last_writer_wins() {
        let store = store();
        store.create_book(&book(&store, "b1", "/a", &[7])).unwrap();
        store.create_book(&book(&store, "b2", "/b", &[7])).unwrap();
        assert_eq!(store.get_book_by_inode(7).unwrap().id, "b2");

        // Dropping the inode from b1 must not unlink b2's claim.
        store.update_book(&book(&store, "b1", "/a", &[])).unwrap();
        assert_eq!(store.get_book_by_inode(7).unwrap().id, "b2");
    }

    #[test]
    fn test_delete_cascades() {
        let store = store();
        store.create_contributor(&Contributor::new("c1", "Frank Herbert", store.now())).unwrap();
        let mut b = book(&store, "b1", "/dune", &[5]);
        b.contributors = vec![BookContributor::new("c1", [ContributorRole::Author])];
        store.create_book(&b).unwrap();
        let shelf = store
            .create_collection(&Collection::new("col", "lib", "u1", "Shelf", store.now()))
            .unwrap();
        store.add_book_to_collection(&shelf.id, "b1").unwrap();

        store.delete_book("b1").unwrap();
        store.delete_book("b1").expect("idempotent");

        assert!(store.get_book("b1").expect_err("gone").is_not_found());
        assert!(store.get_book_by_path("/dune").is_err());
        assert!(store.get_book_by_inode(5).is_err());
        assert!(store.get_collection("col").unwrap().book_ids.is_empty());
        assert!(keys(&store, b"idx:book:").iter().all(|k| k.starts_with("idx:book:updated_at:")
            || k.starts_with("idx:book:deleted_at:")));
        assert!(store.get_contributor("c1").expect_err("orphaned").is_not_found());
    }

    #[test]
    fn test_set_contributors_cleans_orphans() {
        let store = store();
        for (id, name) in [("c1", "Peter Straub"), ("c2", "Stephen King")] {
            store.create_contributor(&Contributor::new(id, name, store.now())).unwrap();
        }
        let mut a = book(&store, "b1", "/talisman", &[]);
        a.contributors = vec![
            BookContributor::new("c1", [ContributorRole::Author]),
            BookContributor::new("c2", [ContributorRole::Author]),
        ];
        store.create_book(&a).unwrap();
        let mut b = book(&store, "b2", "/it", &[]);
        b.contributors = vec![BookContributor::new("c2", [ContributorRole::Author])];
        store.create_book(&b).unwrap();

        store.set_book_contributors("b1", vec![]).unwrap();
        assert!(store.get_contributor("c1").expect_err("orphan").is_not_found());
        assert_eq!(store.get_contributor("c2").unwrap().name, "Stephen King");

        let cancel = CancellationToken::new();
        let by_c2: Vec<String> =
            store.books_by_contributor("c2", &cancel).unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(by_c2, vec!["b2"]);
    }

    #[test]
    fn test_touch_moves_delta_entry_only() {
        let store = store();
        let created = store.create_book(&book(&store, "b1", "/p", &[])).unwrap();
        let touched = store.touch_book("b1").unwrap();
        assert!(touched.updated_at >= created.updated_at);
        assert_eq!(keys(&store, b"idx:book:updated_at:").len(), 1);
    }

    #[test]
    fn test_list_books_skips_deleted() {
        let store = store();
        for i in 0..5 {
            store.create_book(&book(&store, &format!("b{i}"), &format!("/p{i}"), &[])).unwrap();
        }
        store.delete_book("b2").unwrap();
        let cancel = CancellationToken::new();
        let page = store.list_books(&PageParams::first(10), &cancel).unwrap();
        let ids: Vec<String> = page.items.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b0", "b1", "b3", "b4"]);
        assert!(!page.has_more);

        let lib = store.library_books("lib", &PageParams::first(3), &cancel).unwrap();
        assert_eq!(lib.items.len(), 3);
        assert!(lib.has_more);
    }
}
