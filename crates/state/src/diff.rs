//! Set differences for multi-valued relationships.
//!
//! Updates only touch the index entries that actually changed, so every
//! multi-valued field (contributor IDs, series IDs, inodes, collection
//! members) is diffed before any index write is issued.

use std::collections::BTreeSet;

/// Returns `(added, removed)` between two string collections.
///
/// Both outputs are sorted and deduplicated; duplicates in either input are
/// ignored.
pub fn diff_string_set<A, B>(old: &[A], new: &[B]) -> (Vec<String>, Vec<String>)
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let old: BTreeSet<&str> = old.iter().map(AsRef::as_ref).collect();
    let new: BTreeSet<&str> = new.iter().map(AsRef::as_ref).collect();
    let added = new.difference(&old).map(|s| (*s).to_string()).collect();
    let removed = old.difference(&new).map(|s| (*s).to_string()).collect();
    (added, removed)
}

/// Returns `(added, removed)` between two integer collections.
pub fn diff_u64_set(old: &[u64], new: &[u64]) -> (Vec<u64>, Vec<u64>) {
    let old: BTreeSet<u64> = old.iter().copied().collect();
    let new: BTreeSet<u64> = new.iter().copied().collect();
    (new.difference(&old).copied().collect(), old.difference(&new).copied().collect())
}
