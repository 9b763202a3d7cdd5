//! Mirrored relationship edges.
//!
//! A relationship between two record types is stored in both directions:
//!
//! ```text
//! idx:{left}:{right}:{left_id}:{right_id}   (forward)
//! idx:{right}:{left}:{right_id}:{left_id}   (reverse)
//! ```
//!
//! Both keys are written and removed together by every function here; no
//! other module builds edge keys.

use crate::diff::diff_string_set;
use crate::engine::{EngineError, KvRead, WriteTxn};
use crate::keys::{EntityType, index_key, index_prefix, trailing_component};

type Result<T> = std::result::Result<T, EngineError>;

/// A relationship stored in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFamily {
    left: EntityType,
    right: EntityType,
}

/// Book ↔ contributor.
pub const BOOK_CONTRIBUTOR: EdgeFamily = EdgeFamily::new(EntityType::Book, EntityType::Contributor);
/// Book ↔ series.
pub const BOOK_SERIES: EdgeFamily = EdgeFamily::new(EntityType::Book, EntityType::Series);
/// Book ↔ tag.
pub const BOOK_TAG: EdgeFamily = EdgeFamily::new(EntityType::Book, EntityType::Tag);
/// Book ↔ collection.
pub const BOOK_COLLECTION: EdgeFamily = EdgeFamily::new(EntityType::Book, EntityType::Collection);

impl EdgeFamily {
    /// Declares a relationship between `left` and `right`.
    pub const fn new(left: EntityType, right: EntityType) -> Self {
        Self { left, right }
    }

    /// The same relationship viewed from the right-hand side.
    pub const fn reversed(self) -> Self {
        Self { left: self.right, right: self.left }
    }

    fn forward_key(self, from: &str, to: &str) -> Vec<u8> {
        index_key(self.left, self.right.as_str(), &[from, to])
    }

    fn reverse_key(self, from: &str, to: &str) -> Vec<u8> {
        index_key(self.right, self.left.as_str(), &[to, from])
    }

    fn forward_prefix(self, from: &str) -> Vec<u8> {
        index_prefix(self.left, self.right.as_str(), &[from])
    }
}

/// Returns the IDs linked from `from`, sorted.
///
/// # Errors
///
/// Returns an error if the scan fails.
pub fn targets<R: KvRead>(txn: &R, family: EdgeFamily, from: &str) -> Result<Vec<String>> {
    let prefix = family.forward_prefix(from);
    let entries = txn.scan_prefix(&prefix)?;
    Ok(entries.iter().filter_map(|(key, _)| trailing_component(key, &prefix)).collect())
}

/// Whether any edge points at `to` from the left-hand side.
///
/// # Errors
///
/// Returns an error if the scan fails.
pub fn has_sources<R: KvRead>(txn: &R, family: EdgeFamily, to: &str) -> Result<bool> {
    txn.has_prefix(&family.reversed().forward_prefix(to))
}

/// Whether `from` links to anything.
///
/// # Errors
///
/// Returns an error if the scan fails.
pub fn has_targets<R: KvRead>(txn: &R, family: EdgeFamily, from: &str) -> Result<bool> {
    txn.has_prefix(&family.forward_prefix(from))
}

/// Whether the edge `from → to` exists.
///
/// # Errors
///
/// Returns an error if the lookup fails.
pub fn is_linked<R: KvRead>(txn: &R, family: EdgeFamily, from: &str, to: &str) -> Result<bool> {
    txn.exists(&family.forward_key(from, to))
}

/// Writes both directions of `from → to`.
///
/// # Errors
///
/// Returns an error if either write fails.
pub fn add_edge(txn: &mut WriteTxn, family: EdgeFamily, from: &str, to: &str) -> Result<()> {
    txn.put(&family.forward_key(from, to), &[])?;
    txn.put(&family.reverse_key(from, to), &[])
}

/// Removes both directions of `from → to`. Absent edges are ignored.
///
/// # Errors
///
/// Returns an error if either removal fails.
pub fn remove_edge(txn: &mut WriteTxn, family: EdgeFamily, from: &str, to: &str) -> Result<()> {
    txn.delete(&family.forward_key(from, to))?;
    txn.delete(&family.reverse_key(from, to))?;
    Ok(())
}

/// Replaces the edges from `from` with exactly `related`.
///
/// Reads the current edges inside `txn`, diffs them and writes only the
/// change. Returns `(added, removed)`.
///
/// # Errors
///
/// Returns an error if any read or write fails; the caller drops `txn`.
pub fn set_edges<S: AsRef<str>>(
    txn: &mut WriteTxn,
    family: EdgeFamily,
    from: &str,
    related: &[S],
) -> Result<(Vec<String>, Vec<String>)> {
    let current = targets(&*txn, family, from)?;
    let (added, removed) = diff_string_set(&current, related);
    for to in &removed {
        remove_edge(txn, family, from, to)?;
    }
    for to in &added {
        add_edge(txn, family, from, to)?;
    }
    Ok((added, removed))
}

/// Removes every edge from `from`. Returns the IDs it was linked to.
///
/// # Errors
///
/// Returns an error if any read or write fails.
pub fn clear_edges(txn: &mut WriteTxn, family: EdgeFamily, from: &str) -> Result<Vec<String>> {
    let (_, removed) = set_edges::<&str>(txn, family, from, &[])?;
    Ok(removed)
}
