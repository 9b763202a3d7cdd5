//! Shared lifecycle of named identities: contributors and series.
//!
//! Both carry a display name, a list of aliases left behind by merges, and a
//! mirrored edge to the books that credit them. Name and alias lookups are
//! indexed for live records only.

use chrono::{DateTime, Utc};
use folio_types::{Book, Contributor, Series};
use tokio_util::sync::CancellationToken;

use crate::delta::{Synced, save_synced, tombstone_synced, touch_synced};
use crate::diff::diff_string_set;
use crate::edges::{BOOK_CONTRIBUTOR, BOOK_SERIES, EdgeFamily, has_sources, remove_edge, set_edges, targets};
use crate::engine::{KvRead, WriteTxn};
use crate::entity::{ensure_absent, fetch_live, load_live, require};
use crate::error::{Result, StoreError};
use crate::keys::{NameKeys, primary_prefix, trailing_component};
use crate::notify::{Notifier, StoreEvent};
use crate::pagination::{Page, PageParams, scan_page};
use crate::store::Store;

/// A record type with a display name, merge aliases and credited books.
pub(crate) trait Identity: Synced + Clone {
    /// Edge from books to this identity.
    const EDGES: EdgeFamily;

    fn named(id: &str, name: &str, now: DateTime<Utc>) -> Self;
    fn name(&self) -> &str;
    fn aliases(&self) -> &[String];
    fn aliases_mut(&mut self) -> &mut Vec<String>;

    /// IDs of this type a book links to.
    fn linked_ids(book: &Book) -> Vec<String>;

    /// Points a book's links at `source` to `target_id`, keeping the
    /// original byline. Returns whether the book changed.
    fn relink(book: &mut Book, source: &Self, target_id: &str) -> bool;

    /// Moves links credited exactly as `alias` from `canonical_id` to
    /// `new_id`. Returns whether the book changed.
    fn split(book: &mut Book, canonical_id: &str, new_id: &str, alias: &str) -> bool;

    /// Drops every link to `id`. Returns whether the book changed.
    fn unlink(book: &mut Book, id: &str) -> bool;

    fn notify_changed(notifier: &Notifier, record: Self);
    fn notify_deleted(notifier: &Notifier, id: &str);
    fn merged_event(source: &str, target: &str) -> StoreEvent;
}

impl Identity for Contributor {
    const EDGES: EdgeFamily = BOOK_CONTRIBUTOR;

    fn named(id: &str, name: &str, now: DateTime<Utc>) -> Self {
        Contributor::new(id, name, now)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn aliases_mut(&mut self) -> &mut Vec<String> {
        &mut self.aliases
    }

    fn linked_ids(book: &Book) -> Vec<String> {
        book.contributor_ids()
    }

    fn relink(book: &mut Book, source: &Self, target_id: &str) -> bool {
        let Some(pos) = book.contributors.iter().position(|c| c.contributor_id == source.id) else {
            return false;
        };
        let mut entry = book.contributors.remove(pos);
        if entry.credited_as.is_none() {
            entry.credited_as = Some(source.name.clone());
        }
        match book.contributors.iter_mut().find(|c| c.contributor_id == target_id) {
            Some(existing) => existing.roles.extend(entry.roles),
            None => {
                entry.contributor_id = target_id.to_string();
                book.contributors.insert(pos, entry);
            },
        }
        true
    }

    fn split(book: &mut Book, canonical_id: &str, new_id: &str, alias: &str) -> bool {
        let mut changed = false;
        for entry in &mut book.contributors {
            if entry.contributor_id == canonical_id && entry.credited_as.as_deref() == Some(alias) {
                entry.contributor_id = new_id.to_string();
                entry.credited_as = None;
                changed = true;
            }
        }
        changed
    }

    fn unlink(book: &mut Book, id: &str) -> bool {
        let before = book.contributors.len();
        book.contributors.retain(|c| c.contributor_id != id);
        book.contributors.len() != before
    }

    fn notify_changed(notifier: &Notifier, record: Self) {
        notifier.contributor_changed(record);
    }

    fn notify_deleted(notifier: &Notifier, id: &str) {
        notifier.contributor_deleted(id);
    }

    fn merged_event(source: &str, target: &str) -> StoreEvent {
        StoreEvent::ContributorsMerged { source: source.to_string(), target: target.to_string() }
    }
}

impl Identity for Series {
    const EDGES: EdgeFamily = BOOK_SERIES;

    fn named(id: &str, name: &str, now: DateTime<Utc>) -> Self {
        Series::new(id, name, now)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn aliases_mut(&mut self) -> &mut Vec<String> {
        &mut self.aliases
    }

    fn linked_ids(book: &Book) -> Vec<String> {
        book.series_ids()
    }

    fn relink(book: &mut Book, source: &Self, target_id: &str) -> bool {
        let Some(pos) = book.series.iter().position(|s| s.series_id == source.id) else {
            return false;
        };
        let mut entry = book.series.remove(pos);
        if entry.credited_as.is_none() {
            entry.credited_as = Some(source.name.clone());
        }
        match book.series.iter_mut().find(|s| s.series_id == target_id) {
            Some(existing) => {
                if existing.sequence.is_none() {
                    existing.sequence = entry.sequence;
                }
            },
            None => {
                entry.series_id = target_id.to_string();
                book.series.insert(pos, entry);
            },
        }
        true
    }

    fn split(book: &mut Book, canonical_id: &str, new_id: &str, alias: &str) -> bool {
        let mut changed = false;
        for entry in &mut book.series {
            if entry.series_id == canonical_id && entry.credited_as.as_deref() == Some(alias) {
                entry.series_id = new_id.to_string();
                entry.credited_as = None;
                changed = true;
            }
        }
        changed
    }

    fn unlink(book: &mut Book, id: &str) -> bool {
        let before = book.series.len();
        book.series.retain(|s| s.series_id != id);
        book.series.len() != before
    }

    fn notify_changed(notifier: &Notifier, record: Self) {
        notifier.series_changed(record);
    }

    fn notify_deleted(notifier: &Notifier, id: &str) {
        notifier.series_deleted(id);
    }

    fn merged_event(source: &str, target: &str) -> StoreEvent {
        StoreEvent::SeriesMerged { source: source.to_string(), target: target.to_string() }
    }
}

// ============================================================================
// Name and alias index
// ============================================================================

fn normalized_aliases<T: Identity>(record: &T) -> Vec<String> {
    record.aliases().iter().map(|a| NameKeys::normalize(a)).collect()
}

pub(crate) fn index_names<T: Identity>(txn: &mut WriteTxn, record: &T) -> Result<()> {
    txn.put(&NameKeys::name(T::ENTITY, record.name(), record.id()), &[])?;
    for alias in record.aliases() {
        txn.put(&NameKeys::alias(T::ENTITY, alias, record.id()), &[])?;
    }
    Ok(())
}

pub(crate) fn unindex_names<T: Identity>(txn: &mut WriteTxn, record: &T) -> Result<()> {
    txn.delete(&NameKeys::name(T::ENTITY, record.name(), record.id()))?;
    for alias in record.aliases() {
        txn.delete(&NameKeys::alias(T::ENTITY, alias, record.id()))?;
    }
    Ok(())
}

/// Moves name and alias entries from `old` to `new`, touching only what
/// changed.
pub(crate) fn reindex_names<T: Identity>(txn: &mut WriteTxn, old: &T, new: &T) -> Result<()> {
    let id = new.id();
    if NameKeys::normalize(old.name()) != NameKeys::normalize(new.name()) {
        txn.delete(&NameKeys::name(T::ENTITY, old.name(), id))?;
        txn.put(&NameKeys::name(T::ENTITY, new.name(), id), &[])?;
    }
    let (added, removed) = diff_string_set(&normalized_aliases(old), &normalized_aliases(new));
    for alias in &removed {
        txn.delete(&NameKeys::alias(T::ENTITY, alias, id))?;
    }
    for alias in &added {
        txn.put(&NameKeys::alias(T::ENTITY, alias, id), &[])?;
    }
    Ok(())
}

fn first_live<T: Identity, R: KvRead>(txn: &R, prefix: &[u8]) -> Result<Option<T>> {
    for (key, _) in txn.scan_prefix(prefix)? {
        let Some(id) = trailing_component(&key, prefix) else {
            continue;
        };
        if let Some(record) = load_live::<T, _>(txn, &id)? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Adds `alias` unless it matches the name or an existing alias, ignoring
/// case. Returns whether it was added.
pub(crate) fn push_alias<T: Identity>(record: &mut T, alias: &str) -> bool {
    let normalized = NameKeys::normalize(alias);
    if normalized.is_empty()
        || NameKeys::normalize(record.name()) == normalized
        || record.aliases().iter().any(|a| NameKeys::normalize(a) == normalized)
    {
        return false;
    }
    record.aliases_mut().push(alias.to_string());
    true
}

/// Rewrites a book's edges of one identity type to match its join records.
/// Returns `(added, removed)` identity IDs.
pub(crate) fn sync_identity_edges<T: Identity>(txn: &mut WriteTxn, book: &Book) -> Result<(Vec<String>, Vec<String>)> {
    Ok(set_edges(txn, T::EDGES, &book.id, &T::linked_ids(book))?)
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Store {
    pub(crate) fn create_identity_in<T: Identity>(&self, txn: &mut WriteTxn, record: &T) -> Result<T> {
        ensure_absent::<T>(txn, record.id())?;
        let mut stored = record.clone();
        // Only a delete may tombstone.
        stored.clear_deleted_at();
        index_names(txn, &stored)?;
        save_synced(txn, &mut stored, None, self.now())?;
        Ok(stored)
    }

    pub(crate) fn create_identity<T: Identity>(&self, record: &T) -> Result<T> {
        let stored = self.write("identity.create", |txn| self.create_identity_in(txn, record))?;
        T::notify_changed(self.notifier(), stored.clone());
        Ok(stored)
    }

    pub(crate) fn update_identity_in<T: Identity>(&self, txn: &mut WriteTxn, record: &T) -> Result<T> {
        let old: T = require(&*txn, record.id())?;
        let mut stored = record.clone();
        stored.set_created_at(old.created_at());
        stored.clear_deleted_at();
        reindex_names(txn, &old, &stored)?;
        save_synced(txn, &mut stored, Some(old.updated_at()), self.now())?;
        Ok(stored)
    }

    pub(crate) fn update_identity<T: Identity>(&self, record: &T) -> Result<T> {
        let stored = self.write("identity.update", |txn| self.update_identity_in(txn, record))?;
        T::notify_changed(self.notifier(), stored.clone());
        Ok(stored)
    }

    /// Tombstones `record` and detaches it from every book still crediting
    /// it. Returns the books that changed.
    pub(crate) fn tombstone_identity_in<T: Identity>(&self, txn: &mut WriteTxn, record: &mut T) -> Result<Vec<Book>> {
        let now = self.now();
        let id = record.id().to_string();
        let mut changed = Vec::new();
        for book_id in targets(&*txn, T::EDGES.reversed(), &id)? {
            remove_edge(txn, T::EDGES, &book_id, &id)?;
            if let Some(mut book) = load_live::<Book, _>(&*txn, &book_id)? {
                if T::unlink(&mut book, &id) {
                    touch_synced(txn, &mut book, now)?;
                    changed.push(book);
                }
            }
        }
        unindex_names(txn, record)?;
        tombstone_synced(txn, record, now)?;
        Ok(changed)
    }

    /// Soft-deletes an identity. Absent or already deleted records are
    /// ignored.
    pub(crate) fn delete_identity<T: Identity>(&self, id: &str) -> Result<()> {
        let changed = self.write("identity.delete", |txn| {
            let Some(mut record) = load_live::<T, _>(&*txn, id)? else {
                return Ok(None);
            };
            self.tombstone_identity_in(txn, &mut record).map(Some)
        })?;
        if let Some(books) = changed {
            T::notify_deleted(self.notifier(), id);
            for book in books {
                self.notifier().book_changed(book, false);
            }
        }
        Ok(())
    }

    pub(crate) fn get_identity<T: Identity>(&self, id: &str) -> Result<T> {
        require(&self.read()?, id)
    }

    /// Resolves a display name: live primary names first, then aliases.
    pub(crate) fn identity_by_name<T: Identity>(&self, name: &str) -> Result<T> {
        let txn = self.read()?;
        if let Some(record) = first_live::<T, _>(&txn, &NameKeys::name_prefix(T::ENTITY, name))? {
            return Ok(record);
        }
        first_live::<T, _>(&txn, &NameKeys::alias_prefix(T::ENTITY, name))?
            .ok_or_else(|| StoreError::not_found(T::ENTITY, name))
    }

    pub(crate) fn list_identities<T: Identity>(&self, params: &PageParams, cancel: &CancellationToken) -> Result<Page<T>> {
        let txn = self.read()?;
        scan_page(&txn, &primary_prefix(T::ENTITY), params, &self.config().pagination, cancel, |_, value| {
            let record: T = folio_types::decode(value)?;
            Ok((!record.is_deleted()).then_some(record))
        })
    }

    /// Live books crediting the identity, sorted by ID.
    pub(crate) fn books_for_identity<T: Identity>(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Book>> {
        let txn = self.read()?;
        let ids = targets(&txn, T::EDGES.reversed(), id)?;
        fetch_live(&txn, &ids, cancel)
    }

    /// Soft-deletes every candidate no live book credits any more.
    ///
    /// Runs in its own transaction after the edit that dropped the
    /// references has committed. Failures are logged and swallowed.
    pub(crate) fn cleanup_orphans<T: Identity>(&self, candidates: &[String]) {
        if candidates.is_empty() {
            return;
        }
        let result = self.write("identity.cleanup_orphans", |txn| {
            let mut orphaned = Vec::new();
            for id in candidates {
                if has_sources(&*txn, T::EDGES, id)? {
                    continue;
                }
                if let Some(mut record) = load_live::<T, _>(&*txn, id)? {
                    self.tombstone_identity_in(txn, &mut record)?;
                    orphaned.push(id.clone());
                }
            }
            Ok(orphaned)
        });
        match result {
            Ok(orphaned) => {
                for id in &orphaned {
                    tracing::debug!(entity = %T::ENTITY, id = %id, "Soft-deleted orphan");
                    T::notify_deleted(self.notifier(), id);
                }
            },
            Err(e) => {
                tracing::warn!(entity = %T::ENTITY, error = %e, "Orphan cleanup failed");
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;
    use folio_types::{BookContributor, BookSeries, ContributorRole};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_contributor_relink_unions_roles_and_keeps_byline() {
        let source = Contributor::new("a", "Richard Bachman", now());
        let mut book = Book::new("b", "l", "t", "/p", now());
        book.contributors = vec![
            BookContributor::new("a", [ContributorRole::Author]),
            BookContributor::new("k", [ContributorRole::Narrator]),
        ];
        assert!(Contributor::relink(&mut book, &source, "k"));
        assert_eq!(book.contributors.len(), 1);
        assert_eq!(
            book.contributors[0].roles.iter().copied().collect::<Vec<_>>(),
            vec![ContributorRole::Author, ContributorRole::Narrator]
        );

        let mut other = Book::new("c", "l", "t", "/q", now());
        other.contributors = vec![BookContributor::new("a", [ContributorRole::Author])];
        assert!(Contributor::relink(&mut other, &source, "k"));
        assert_eq!(other.contributors[0].contributor_id, "k");
        assert_eq!(other.contributors[0].credited_as.as_deref(), Some("Richard Bachman"));
    }

    #[test]
    fn test_split_matches_byline_exactly() {
        let mut book = Book::new("b", "l", "t", "/p", now());
        book.series = vec![
            BookSeries::new("s", Some("1")).credited_as("Dark Tower"),
            BookSeries::new("s", Some("2")).credited_as("dark tower"),
        ];
        assert!(Series::split(&mut book, "s", "n", "Dark Tower"));
        assert_eq!(book.series[0].series_id, "n");
        assert!(book.series[0].credited_as.is_none());
        assert_eq!(book.series[1].series_id, "s");
        assert!(!Series::split(&mut book, "s", "n", "Gunslinger"));
    }

    #[test]
    fn test_push_alias_ignores_case_duplicates() {
        let mut c = Contributor::new("k", "Stephen King", now());
        assert!(push_alias(&mut c, "Richard Bachman"));
        assert!(!push_alias(&mut c, "richard bachman"));
        assert!(!push_alias(&mut c, "STEPHEN KING"));
        assert!(!push_alias(&mut c, "  "));
        assert_eq!(c.aliases, vec!["Richard Bachman"]);
    }
}
