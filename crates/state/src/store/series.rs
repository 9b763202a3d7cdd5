//! Series operations.

use folio_types::{Book, Series};
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::error::Result;
use crate::pagination::{Page, PageParams};

impl Store {
    /// Stores a new series stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the ID is taken.
    pub fn create_series(&self, series: &Series) -> Result<Series> {
        self.create_identity(series)
    }

    /// Returns a live series.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// series is absent or deleted.
    pub fn get_series(&self, id: &str) -> Result<Series> {
        self.get_identity(id)
    }

    /// Resolves a series name, live names first and merge aliases second.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// nothing matches.
    pub fn series_by_name(&self, name: &str) -> Result<Series> {
        self.identity_by_name(name)
    }

    /// Replaces a series' fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// series is absent or deleted.
    pub fn update_series(&self, series: &Series) -> Result<Series> {
        self.update_identity(series)
    }

    /// Soft-deletes a series and drops it from every book in it.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_series(&self, id: &str) -> Result<()> {
        self.delete_identity::<Series>(id)
    }

    /// One page of live series in ID order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`](crate::StoreError::InvalidInput)
    /// for a malformed cursor.
    pub fn list_series(&self, params: &PageParams, cancel: &CancellationToken) -> Result<Page<Series>> {
        self.list_identities(params, cancel)
    }

    /// Live books in a series, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan is cancelled or fails.
    pub fn books_by_series(&self, series_id: &str, cancel: &CancellationToken) -> Result<Vec<Book>> {
        self.books_for_identity::<Series>(series_id, cancel)
    }
}
