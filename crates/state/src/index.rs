//! Declarative secondary indexes.
//!
//! Each record type that uses [`IndexedEntity`](crate::IndexedEntity) declares
//! its indexes once, as an [`IndexSet`]. The set derives every index value
//! from a record, diffs old against new inside the caller's write
//! transaction and issues only the changed entries.
//!
//! Key layout:
//!
//! ```text
//! idx:{type}:{index}:{value}        → id     (unique)
//! idx:{type}:{index}:{value}:{id}   → empty  (non-unique)
//! ```

use crate::diff::diff_string_set;
use crate::engine::{KvRead, WriteTxn};
use crate::error::{Result, StoreError};
use crate::keys::{EntityType, index_key, index_prefix, trailing_component};

enum Extractor<T> {
    Single(fn(&T) -> Option<String>),
    Multi(fn(&T) -> Vec<String>),
}

/// One named secondary index over records of type `T`.
pub struct IndexDef<T> {
    name: &'static str,
    extract: Extractor<T>,
    unique: bool,
    normalize: Option<fn(&str) -> String>,
}

impl<T> IndexDef<T> {
    /// Index over one optional value per record.
    pub fn single(name: &'static str, extract: fn(&T) -> Option<String>) -> Self {
        Self { name, extract: Extractor::Single(extract), unique: false, normalize: None }
    }

    /// Index over any number of values per record.
    pub fn multi(name: &'static str, extract: fn(&T) -> Vec<String>) -> Self {
        Self { name, extract: Extractor::Multi(extract), unique: false, normalize: None }
    }

    /// At most one record may hold each value.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Transform applied to caller input before a lookup.
    ///
    /// Extraction is not affected; the extractor is expected to produce
    /// values already in normalized form.
    #[must_use]
    pub fn normalize_lookup(mut self, normalize: fn(&str) -> String) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Index name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the index is unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    fn values(&self, record: &T) -> Vec<String> {
        let mut values = match &self.extract {
            Extractor::Single(f) => f(record).into_iter().collect(),
            Extractor::Multi(f) => f(record),
        };
        values.retain(|v| !v.is_empty());
        values
    }

    fn lookup_value(&self, raw: &str) -> String {
        match self.normalize {
            Some(normalize) => normalize(raw),
            None => raw.to_string(),
        }
    }
}

/// The indexes declared for one record type.
pub struct IndexSet<T> {
    entity: EntityType,
    defs: Vec<IndexDef<T>>,
}

impl<T> IndexSet<T> {
    /// Creates an empty set for records stored under `entity`.
    pub fn new(entity: EntityType) -> Self {
        Self { entity, defs: Vec::new() }
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn with(mut self, def: IndexDef<T>) -> Self {
        self.defs.push(def);
        self
    }

    fn def(&self, name: &str) -> Result<&IndexDef<T>> {
        self.defs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| StoreError::invalid(format!("unknown {} index '{name}'", self.entity)))
    }

    fn entry_key(&self, def: &IndexDef<T>, value: &str, id: &str) -> Vec<u8> {
        if def.unique {
            index_key(self.entity, def.name, &[value])
        } else {
            index_key(self.entity, def.name, &[value, id])
        }
    }

    /// Brings every index for `id` from `old` to `new`.
    ///
    /// `old = None` indexes a new record; `new = None` removes a record's
    /// entries. Only changed values are written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a unique value is held by another
    /// record, or an engine error. The caller drops `txn` on error.
    pub fn apply(&self, txn: &mut WriteTxn, id: &str, old: Option<&T>, new: Option<&T>) -> Result<()> {
        for def in &self.defs {
            let old_values = old.map(|r| def.values(r)).unwrap_or_default();
            let new_values = new.map(|r| def.values(r)).unwrap_or_default();
            let (added, removed) = diff_string_set(&old_values, &new_values);

            for value in &removed {
                let key = self.entry_key(def, value, id);
                if def.unique {
                    // A unique entry is only ours to remove if it points at us.
                    if txn.get(&key)?.as_deref() != Some(id.as_bytes()) {
                        continue;
                    }
                }
                txn.delete(&key)?;
            }

            for value in &added {
                let key = self.entry_key(def, value, id);
                if def.unique {
                    if let Some(holder) = txn.get(&key)? {
                        if holder != id.as_bytes() {
                            return Err(StoreError::Conflict {
                                index: def.name.to_string(),
                                value: value.clone(),
                            });
                        }
                    }
                    txn.put(&key, id.as_bytes())?;
                } else {
                    txn.put(&key, &[])?;
                }
            }
        }
        Ok(())
    }

    /// Returns the IDs of records whose `index` holds `value`, sorted.
    ///
    /// `value` passes through the index's lookup normalizer first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an undeclared index, or an
    /// engine error.
    pub fn lookup<R: KvRead>(&self, txn: &R, index: &str, value: &str) -> Result<Vec<String>> {
        let def = self.def(index)?;
        let value = def.lookup_value(value);
        if def.unique {
            let key = index_key(self.entity, def.name, &[&value]);
            return Ok(match txn.get(&key)? {
                Some(id) => vec![String::from_utf8_lossy(&id).into_owned()],
                None => Vec::new(),
            });
        }
        let prefix = index_prefix(self.entity, def.name, &[&value]);
        let entries = txn.scan_prefix(&prefix)?;
        Ok(entries.iter().filter_map(|(key, _)| trailing_component(key, &prefix)).collect())
    }
}
