//! Contributor operations.

use folio_types::{Book, Contributor};
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::error::Result;
use crate::pagination::{Page, PageParams};

impl Store {
    /// Stores a new contributor stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the ID is taken, deleted contributors included.
    pub fn create_contributor(&self, contributor: &Contributor) -> Result<Contributor> {
        self.create_identity(contributor)
    }

    /// Returns a live contributor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// contributor is absent or deleted.
    pub fn get_contributor(&self, id: &str) -> Result<Contributor> {
        self.get_identity(id)
    }

    /// Resolves a display name, live names first and merge aliases second.
    /// Matching ignores case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// nothing matches.
    pub fn contributor_by_name(&self, name: &str) -> Result<Contributor> {
        self.identity_by_name(name)
    }

    /// Replaces a contributor's fields and moves its name entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// contributor is absent or deleted.
    pub fn update_contributor(&self, contributor: &Contributor) -> Result<Contributor> {
        self.update_identity(contributor)
    }

    /// Soft-deletes a contributor and drops it from every book crediting it.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_contributor(&self, id: &str) -> Result<()> {
        self.delete_identity::<Contributor>(id)
    }

    /// One page of live contributors in ID order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`](crate::StoreError::InvalidInput)
    /// for a malformed cursor.
    pub fn list_contributors(&self, params: &PageParams, cancel: &CancellationToken) -> Result<Page<Contributor>> {
        self.list_identities(params, cancel)
    }

    /// Live books crediting a contributor, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn books_by_contributor(&self, contributor_id: &str, cancel: &CancellationToken) -> Result<Vec<Book>> {
        self.books_for_identity::<Contributor>(contributor_id, cancel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use folio_types::config::FolioConfig;

    use super::*;

    fn store() -> Store {
        Store::in_memory(FolioConfig::default()).expect("store")
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        let store = store();
        let c = store.create_contributor(&Contributor::new("c1", "Ursula K. Le Guin", store.now())).unwrap();
        assert_eq!(store.contributor_by_name("  ursula k. le guin ").unwrap().id, c.id);
        assert!(store.contributor_by_name("Le Guin").expect_err("no match").is_not_found());
    }

    #[test]
    fn test_rename_moves_name_entry() {
        let store = store();
        let mut c = store.create_contributor(&Contributor::new("c1", "Iain Banks", store.now())).unwrap();
        c.name = "Iain M. Banks".into();
        store.update_contributor(&c).unwrap();
        assert!(store.contributor_by_name("Iain Banks").is_err());
        assert_eq!(store.contributor_by_name("Iain M. Banks").unwrap().id, "c1");
    }

    #[test]
    fn test_delete_hides_and_blocks_recreate() {
        let store = store();
        let c = Contributor::new("c1", "Anonymous", store.now());
        store.create_contributor(&c).unwrap();
        store.delete_contributor("c1").unwrap();
        store.delete_contributor("c1").expect("idempotent");
        assert!(store.get_contributor("c1").expect_err("deleted").is_not_found());
        assert!(store.contributor_by_name("Anonymous").is_err());
        assert!(store.create_contributor(&c).is_err());
    }
}
