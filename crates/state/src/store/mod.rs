//! The store facade.
//!
//! [`Store`] owns the engine, the configuration, the library cache and the
//! notifier. Each entity-level mutation runs as one write transaction
//! through [`Store::write`]: primary record, index maintenance and the
//! delta entry commit together or not at all. Side effects are dispatched
//! only after the commit succeeds.
//!
//! Operations are grouped by record type in the submodules; access control,
//! delta sync, merging and batching live in their own modules at the crate
//! root and extend `Store` from there.

mod books;
mod collections;
mod contributors;
pub(crate) mod identity;
mod libraries;
mod series;
mod sessions;
mod shares;
mod tags;
mod users;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_types::config::FolioConfig;
use folio_types::{CollectionShare, Session, User};

use crate::cache::LibraryCache;
use crate::engine::{ReadTxn, StorageEngine, WriteTxn};
use crate::entity::IndexedEntity;
use crate::error::{Result, StoreError};
use crate::notify::{Notifier, StoreEnricher};
use crate::retry::with_write_retry;

/// Persistence and access-control core of the library server.
pub struct Store {
    engine: StorageEngine,
    config: FolioConfig,
    notifier: Notifier,
    libraries: LibraryCache,
    users: IndexedEntity<User>,
    sessions: IndexedEntity<Session>,
    shares: IndexedEntity<CollectionShare>,
}

impl Store {
    /// Opens or creates a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an invalid configuration or
    /// an engine error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>, config: FolioConfig) -> Result<Self> {
        config.validate().map_err(|e| StoreError::invalid(e.to_string()))?;
        let engine = StorageEngine::open(path, &config.storage)?;
        Ok(Self::new(engine, config))
    }

    /// Creates a store backed by memory only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an invalid configuration.
    pub fn in_memory(config: FolioConfig) -> Result<Self> {
        config.validate().map_err(|e| StoreError::invalid(e.to_string()))?;
        let engine = StorageEngine::in_memory()?;
        Ok(Self::new(engine, config))
    }

    /// Wraps an open engine.
    ///
    /// The default notifier enriches books from this store and discards
    /// every side effect; replace it with [`Store::with_notifier`].
    pub fn new(engine: StorageEngine, config: FolioConfig) -> Self {
        let notifier = Notifier::noop(&config.notifier)
            .with_enricher(Arc::new(StoreEnricher::new(engine.clone())));
        let retry = config.retry.clone();
        Self {
            users: IndexedEntity::new(engine.clone(), users::indexes(), retry.clone()),
            sessions: IndexedEntity::new(engine.clone(), sessions::indexes(), retry.clone()),
            shares: IndexedEntity::new(engine.clone(), shares::indexes(), retry),
            libraries: LibraryCache::new(),
            engine,
            config,
            notifier,
        }
    }

    /// Replaces the side-effect notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// The underlying engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Active configuration.
    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn library_cache(&self) -> &LibraryCache {
        &self.libraries
    }

    pub(crate) fn shares(&self) -> &IndexedEntity<CollectionShare> {
        &self.shares
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub(crate) fn read(&self) -> Result<ReadTxn> {
        Ok(self.engine.read()?)
    }

    /// Runs `f` in a write transaction and commits it, retrying transient
    /// engine failures. An error from `f` drops the transaction.
    pub(crate) fn write<T, F>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut WriteTxn) -> Result<T>,
    {
        with_write_retry(&self.config.retry, operation, || {
            let mut txn = self.engine.write()?;
            let out = f(&mut txn)?;
            txn.commit()?;
            tracing::debug!(operation, "Write committed");
            Ok(out)
        })
    }
}
