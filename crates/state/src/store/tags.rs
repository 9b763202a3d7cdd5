//! Tags: administrative labels attached to books.
//!
//! Tags are hard deleted. The slug is unique and maps to the tag ID.

use folio_types::{Book, Tag};
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::edges::{BOOK_TAG, add_edge, clear_edges, is_linked, remove_edge, targets};
use crate::engine::KvRead;
use crate::entity::{EntityIter, ensure_absent, fetch_live, load, remove, require, save};
use crate::error::{ConflictSnafu, Result, StoreError};
use crate::keys::{EntityType, TagKeys};
use crate::notify::StoreEvent;

impl Store {
    /// Creates a tag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an empty slug,
    /// [`StoreError::AlreadyExists`] if the ID is taken or
    /// [`StoreError::Conflict`] if the slug is.
    pub fn create_tag(&self, tag: &Tag) -> Result<Tag> {
        if tag.slug.trim().is_empty() {
            return Err(StoreError::invalid("tag slug must not be empty"));
        }
        self.write("tag.create", |txn| {
            ensure_absent::<Tag>(txn, &tag.id)?;
            let key = TagKeys::slug(&tag.slug);
            if txn.exists(&key)? {
                return ConflictSnafu { index: "slug", value: tag.slug.clone() }.fail();
            }
            txn.put(&key, tag.id.as_bytes())?;
            save(txn, tag)
        })?;
        self.notifier().publish(StoreEvent::TagCreated(tag.clone()));
        Ok(tag.clone())
    }

    /// Returns a tag by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub fn get_tag(&self, id: &str) -> Result<Tag> {
        require(&self.read()?, id)
    }

    /// Returns a tag by slug.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no tag holds the slug.
    pub fn get_tag_by_slug(&self, slug: &str) -> Result<Tag> {
        let txn = self.read()?;
        let id = txn
            .get(&TagKeys::slug(slug))?
            .and_then(|value| String::from_utf8(value).ok())
            .ok_or_else(|| StoreError::not_found(EntityType::Tag, slug))?;
        require(&txn, &id)
    }

    /// Lazily lists every tag in ID order.
    pub fn list_tags(&self, cancel: &CancellationToken) -> EntityIter<Tag> {
        EntityIter::new(self.engine().clone(), cancel)
    }

    /// Deletes a tag and detaches it from every book. Absent tags are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_tag(&self, id: &str) -> Result<()> {
        let deleted = self.write("tag.delete", |txn| {
            let Some(tag) = load::<Tag, _>(&*txn, id)? else {
                return Ok(false);
            };
            let books = clear_edges(txn, BOOK_TAG.reversed(), id)?;
            tracing::debug!(tag_id = %id, books = books.len(), "Deleting tag");
            txn.delete(&TagKeys::slug(&tag.slug))?;
            remove::<Tag>(txn, id)
        })?;
        if deleted {
            self.notifier().publish(StoreEvent::TagDeleted { id: id.to_string() });
        }
        Ok(())
    }

    /// Attaches a tag to a live book.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the book or tag is absent.
    pub fn add_tag_to_book(&self, book_id: &str, tag_id: &str) -> Result<()> {
        let attached = self.write("tag.attach", |txn| {
            require::<Book, _>(&*txn, book_id)?;
            require::<Tag, _>(&*txn, tag_id)?;
            if is_linked(&*txn, BOOK_TAG, book_id, tag_id)? {
                return Ok(false);
            }
            add_edge(txn, BOOK_TAG, book_id, tag_id)?;
            Ok(true)
        })?;
        if attached {
            self.notifier()
                .publish(StoreEvent::BookTagged { book_id: book_id.to_string(), tag_id: tag_id.to_string() });
        }
        Ok(())
    }

    /// Detaches a tag from a book. Missing links are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine error.
    pub fn remove_tag_from_book(&self, book_id: &str, tag_id: &str) -> Result<()> {
        let detached = self.write("tag.detach", |txn| {
            if !is_linked(&*txn, BOOK_TAG, book_id, tag_id)? {
                return Ok(false);
            }
            remove_edge(txn, BOOK_TAG, book_id, tag_id)?;
            Ok(true)
        })?;
        if detached {
            self.notifier()
                .publish(StoreEvent::BookUntagged { book_id: book_id.to_string(), tag_id: tag_id.to_string() });
        }
        Ok(())
    }

    /// Tags attached to a book, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn tags_for_book(&self, book_id: &str) -> Result<Vec<Tag>> {
        let txn = self.read()?;
        let ids = targets(&txn, BOOK_TAG, book_id)?;
        fetch_live(&txn, &ids, &CancellationToken::new())
    }

    /// Live books carrying a tag, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn books_for_tag(&self, tag_id: &str, cancel: &CancellationToken) -> Result<Vec<Book>> {
        let txn = self.read()?;
        let ids = targets(&txn, BOOK_TAG.reversed(), tag_id)?;
        fetch_live(&txn, &ids, cancel)
    }
}
