//! Merging duplicate contributors and series, and undoing it.
//!
//! A merge folds a source identity into a target: the target keeps the
//! source's name as an alias, every book crediting the source is relinked
//! to the target with the original byline kept in `credited_as`, and the
//! source is soft-deleted. Unmerge reverses this for one alias, moving only
//! the books whose byline matches that alias exactly.

use folio_types::{Book, Contributor, Series, new_id};

use crate::delta::{save_synced, touch_synced};
use crate::edges::targets;
use crate::entity::{load_live, require};
use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::store::identity::{Identity, push_alias, reindex_names, sync_identity_edges};

impl Store {
    fn merge_identities<T: Identity>(&self, source_id: &str, target_id: &str) -> Result<T> {
        if source_id == target_id {
            return Err(StoreError::invalid(format!("cannot merge {} {source_id} into itself", T::ENTITY)));
        }
        let (target, books) = self.write("identity.merge", |txn| {
            let now = self.now();
            let mut source: T = require(&*txn, source_id)?;
            let old_target: T = require(&*txn, target_id)?;

            let mut target = old_target.clone();
            push_alias(&mut target, source.name());
            for alias in source.aliases() {
                push_alias(&mut target, alias);
            }
            reindex_names(txn, &old_target, &target)?;
            save_synced(txn, &mut target, Some(old_target.updated_at()), now)?;

            let mut books = Vec::new();
            for book_id in targets(&*txn, T::EDGES.reversed(), source_id)? {
                let Some(mut book) = load_live::<Book, _>(&*txn, &book_id)? else {
                    continue;
                };
                if T::relink(&mut book, &source, target_id) {
                    sync_identity_edges::<T>(txn, &book)?;
                    touch_synced(txn, &mut book, now)?;
                    books.push(book);
                }
            }

            // Edges are already moved, so this only hides the source.
            self.tombstone_identity_in(txn, &mut source)?;
            Ok((target, books))
        })?;

        tracing::info!(entity = %T::ENTITY, source_id, target_id, books = books.len(), "Merged");
        T::notify_changed(self.notifier(), target.clone());
        T::notify_deleted(self.notifier(), source_id);
        self.notifier().publish(T::merged_event(source_id, target_id));
        for book in books {
            self.notifier().book_changed(book, false);
        }
        Ok(target)
    }

    fn unmerge_identity<T: Identity>(&self, canonical_id: &str, alias: &str) -> Result<T> {
        let (created, canonical, books) = self.write("identity.unmerge", |txn| {
            let now = self.now();
            let old: T = require(&*txn, canonical_id)?;
            let Some(pos) = old.aliases().iter().position(|a| a == alias) else {
                return Err(StoreError::invalid(format!(
                    "alias '{alias}' is not recorded on {} {canonical_id}",
                    T::ENTITY
                )));
            };
            let mut canonical = old.clone();
            canonical.aliases_mut().remove(pos);
            reindex_names(txn, &old, &canonical)?;
            save_synced(txn, &mut canonical, Some(old.updated_at()), now)?;

            let created = self.create_identity_in(txn, &T::named(&new_id(), alias, now))?;

            let mut books = Vec::new();
            for book_id in targets(&*txn, T::EDGES.reversed(), canonical_id)? {
                let Some(mut book) = load_live::<Book, _>(&*txn, &book_id)? else {
                    continue;
                };
                if T::split(&mut book, canonical_id, created.id(), alias) {
                    sync_identity_edges::<T>(txn, &book)?;
                    touch_synced(txn, &mut book, now)?;
                    books.push(book);
                }
            }
            Ok((created, canonical, books))
        })?;

        tracing::info!(entity = %T::ENTITY, canonical_id, new_id = %created.id(), books = books.len(), "Unmerged");
        T::notify_changed(self.notifier(), canonical);
        T::notify_changed(self.notifier(), created.clone());
        for book in books {
            self.notifier().book_changed(book, false);
        }
        Ok(created)
    }

    /// Folds contributor `source_id` into `target_id` and returns the
    /// updated target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if either contributor is absent or
    /// [`StoreError::InvalidInput`] if they are the same.
    pub fn merge_contributors(&self, source_id: &str, target_id: &str) -> Result<Contributor> {
        self.merge_identities(source_id, target_id)
    }

    /// Splits `alias` off contributor `canonical_id` into a new contributor,
    /// which is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the contributor is absent or
    /// [`StoreError::InvalidInput`] if `alias` is not one of its aliases.
    pub fn unmerge_contributor(&self, canonical_id: &str, alias: &str) -> Result<Contributor> {
        self.unmerge_identity(canonical_id, alias)
    }

    /// Folds series `source_id` into `target_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if either series is absent or
    /// [`StoreError::InvalidInput`] if they are the same.
    pub fn merge_series(&self, source_id: &str, target_id: &str) -> Result<Series> {
        self.merge_identities(source_id, target_id)
    }

    /// Splits `alias` off series `canonical_id` into a new series.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the series is absent or
    /// [`StoreError::InvalidInput`] if `alias` is not one of its aliases.
    pub fn unmerge_series(&self, canonical_id: &str, alias: &str) -> Result<Series> {
        self.unmerge_identity(canonical_id, alias)
    }
}
