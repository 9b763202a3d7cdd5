//! Library operations.
//!
//! Reads go through the library cache; every committed mutation drops it.

use folio_types::Library;

use super::Store;
use crate::entity::{ensure_absent, load, remove, require, save};
use crate::error::{Result, StoreError};
use crate::keys::{CollectionKeys, EntityType};
use crate::notify::StoreEvent;

impl Store {
    /// Creates a library.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the ID is taken.
    pub fn create_library(&self, library: &Library) -> Result<Library> {
        let stored = self.write("library.create", |txn| {
            ensure_absent::<Library>(txn, &library.id)?;
            let mut stored = library.clone();
            stored.updated_at = self.now();
            save(txn, &stored)?;
            Ok(stored)
        })?;
        self.library_cache().invalidate();
        self.notifier().publish(StoreEvent::LibraryUpdated(stored.clone()));
        Ok(stored)
    }

    /// Returns a library.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub fn get_library(&self, id: &str) -> Result<Library> {
        self.library_cache()
            .get(self.engine(), id)?
            .ok_or_else(|| StoreError::not_found(EntityType::Library, id))
    }

    /// Every library, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        self.library_cache().all(self.engine())
    }

    /// Replaces a library, typically to change its access mode or paths.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub fn update_library(&self, library: &Library) -> Result<Library> {
        let stored = self.write("library.update", |txn| {
            let old: Library = require(&*txn, &library.id)?;
            let mut stored = library.clone();
            stored.created_at = old.created_at;
            stored.updated_at = self.now();
            save(txn, &stored)?;
            Ok(stored)
        })?;
        self.library_cache().invalidate();
        tracing::info!(library_id = %stored.id, mode = ?stored.access_mode, "Library updated");
        self.notifier().publish(StoreEvent::LibraryUpdated(stored.clone()));
        Ok(stored)
    }

    /// Deletes a library record and its inbox pointer. Books and
    /// collections are left in place and fall back to open access. Absent
    /// libraries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_library(&self, id: &str) -> Result<()> {
        let deleted = self.write("library.delete", |txn| {
            if load::<Library, _>(&*txn, id)?.is_none() {
                return Ok(false);
            }
            txn.delete(&CollectionKeys::inbox(id))?;
            remove::<Library>(txn, id)
        })?;
        if deleted {
            self.library_cache().invalidate();
            self.notifier().publish(StoreEvent::LibraryDeleted { id: id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use folio_types::AccessMode;
    use folio_types::config::FolioConfig;

    use super::*;

    #[test]
    fn test_update_invalidates_cache() {
        let store = Store::in_memory(FolioConfig::default()).unwrap();
        let mut lib = store.create_library(&Library::new("l1", "Audiobooks", "admin", store.now())).unwrap();
        assert_eq!(store.get_library("l1").unwrap().access_mode, AccessMode::Open);

        lib.access_mode = AccessMode::Restricted;
        store.update_library(&lib).unwrap();
        assert_eq!(store.get_library("l1").unwrap().access_mode, AccessMode::Restricted);
        assert_eq!(store.access_context("u", "l1").unwrap().mode, AccessMode::Restricted);

        store.delete_library("l1").unwrap();
        assert!(store.get_library("l1").expect_err("deleted").is_not_found());
        assert!(store.list_libraries().unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let store = Store::in_memory(FolioConfig::default()).unwrap();
        let lib = Library::new("l1", "A", "admin", store.now());
        store.create_library(&lib).unwrap();
        assert!(matches!(store.create_library(&lib), Err(StoreError::AlreadyExists { .. })));
    }
}
