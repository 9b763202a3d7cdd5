//! Read-through cache for libraries.
//!
//! Libraries are read on every access decision and written almost never.
//! The cache loads every library on first use and is dropped wholesale by
//! any library mutation; it is never patched in place. Only libraries are
//! cached.

use std::collections::HashMap;

use folio_types::{Library, decode};
use parking_lot::RwLock;

use crate::engine::{KvRead, StorageEngine};
use crate::error::Result;
use crate::keys::{EntityType, primary_prefix};

#[derive(Default)]
struct Cached {
    // Bumped by every invalidation; a load that raced one is discarded.
    generation: u64,
    entries: Option<HashMap<String, Library>>,
}

/// Library cache owned by the store.
#[derive(Default)]
pub struct LibraryCache {
    state: RwLock<Cached>,
}

impl LibraryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a library by ID, loading the cache if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache has to be loaded and the read fails.
    pub fn get(&self, engine: &StorageEngine, id: &str) -> Result<Option<Library>> {
        {
            let state = self.state.read();
            if let Some(entries) = state.entries.as_ref() {
                return Ok(entries.get(id).cloned());
            }
        }
        Ok(self.load(engine)?.get(id).cloned())
    }

    /// Returns every library sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache has to be loaded and the read fails.
    pub fn all(&self, engine: &StorageEngine) -> Result<Vec<Library>> {
        let cached = self.state.read().entries.clone();
        let entries = match cached {
            Some(entries) => entries,
            None => self.load(engine)?,
        };
        let mut libraries: Vec<Library> = entries.into_values().collect();
        libraries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(libraries)
    }

    /// Drops every cached entry. Called after any library mutation commits.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.entries = None;
    }

    fn load(&self, engine: &StorageEngine) -> Result<HashMap<String, Library>> {
        let generation = self.state.read().generation;
        let txn = engine.read()?;
        let mut entries = HashMap::new();
        for (_, value) in txn.scan_prefix(&primary_prefix(EntityType::Library))? {
            let library: Library = decode(&value)?;
            entries.insert(library.id.clone(), library);
        }
        let mut state = self.state.write();
        if state.generation == generation {
            state.entries = Some(entries.clone());
        }
        Ok(entries)
    }
}
