//! Post-commit side effects.
//!
//! Search reindexing, change events and transcode cleanup are projections of
//! the authoritative store. The [`Notifier`] runs each one as a detached
//! Tokio task bounded by [`NotifierConfig::timeout`] after the write has
//! committed. Failures and timeouts are logged and never reach the caller
//! of the write.
//!
//! Without a Tokio runtime (plain synchronous callers, tools) dispatch is
//! skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_types::config::NotifierConfig;
use folio_types::{Book, Collection, CollectionShare, Contributor, ContributorRole, Library, Series, Tag};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::engine::{KvRead, StorageEngine};
use crate::entity::load;

/// Failure reported by a collaborator.
#[derive(Debug, Snafu)]
pub enum NotifyError {
    /// The collaborator rejected or could not complete the request.
    #[snafu(display("{collaborator} failed: {message}"))]
    Failed { collaborator: &'static str, message: String },
}

/// Result type for collaborator calls.
pub type NotifyResult = std::result::Result<(), NotifyError>;

// ============================================================================
// Payloads
// ============================================================================

/// A contributor credit resolved to a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorCredit {
    /// Canonical contributor.
    pub contributor_id: String,
    /// Byline: the book's `credited_as`, else the contributor's name.
    pub name: String,
    /// Roles on this book.
    pub roles: Vec<ContributorRole>,
}

/// A series membership resolved to a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCredit {
    /// Canonical series.
    pub series_id: String,
    /// The book's `credited_as`, else the series' name.
    pub name: String,
    /// Position within the series.
    pub sequence: Option<String>,
}

/// A book denormalized for search and event consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    /// The stored record.
    pub book: Book,
    /// Resolved contributor credits. Empty when not enriched.
    pub contributors: Vec<ContributorCredit>,
    /// Resolved series memberships. Empty when not enriched.
    pub series: Vec<SeriesCredit>,
    /// Whether names were resolved.
    pub enriched: bool,
}

impl BookView {
    /// A view carrying only the raw record.
    pub fn bare(book: Book) -> Self {
        Self { book, contributors: Vec::new(), series: Vec::new(), enriched: false }
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    /// A book was created.
    BookCreated(Box<BookView>),
    /// A book was updated or touched.
    BookUpdated(Box<BookView>),
    /// A book was soft-deleted.
    BookDeleted { id: String },
    /// A contributor was created or updated.
    ContributorUpdated(Contributor),
    /// A contributor was soft-deleted.
    ContributorDeleted { id: String },
    /// `source` was merged into `target`.
    ContributorsMerged { source: String, target: String },
    /// A series was created or updated.
    SeriesUpdated(Series),
    /// A series was soft-deleted.
    SeriesDeleted { id: String },
    /// `source` was merged into `target`.
    SeriesMerged { source: String, target: String },
    /// A collection was created, updated or had its membership changed.
    CollectionUpdated(Collection),
    /// A collection was soft-deleted.
    CollectionDeleted { id: String },
    /// A collection was shared with a user, or the share's permission
    /// changed.
    CollectionShared(CollectionShare),
    /// A user's share of a collection was revoked.
    CollectionUnshared { collection_id: String, user_id: String },
    /// A library was created or updated.
    LibraryUpdated(Library),
    /// A library was deleted.
    LibraryDeleted { id: String },
    /// A tag was created.
    TagCreated(Tag),
    /// A tag was deleted and detached from every book.
    TagDeleted { id: String },
    /// A tag was attached to a book.
    BookTagged { book_id: String, tag_id: String },
    /// A tag was detached from a book.
    BookUntagged { book_id: String, tag_id: String },
    /// A user was created or updated.
    UserUpdated { id: String },
    /// A user was deleted with their sessions and received shares.
    UserDeleted { id: String },
    /// A session was opened.
    SessionCreated { id: String, user_id: String },
    /// A session was removed, by logout or expiry.
    SessionDeleted { id: String, user_id: String },
}

// ============================================================================
// Collaborators
// ============================================================================

/// Full-text search projection.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Indexes or reindexes a book.
    async fn index_book(&self, book: &BookView) -> NotifyResult;
    /// Removes a book from the index.
    async fn delete_book(&self, id: &str) -> NotifyResult;
    /// Indexes or reindexes a contributor.
    async fn index_contributor(&self, contributor: &Contributor) -> NotifyResult;
    /// Removes a contributor from the index.
    async fn delete_contributor(&self, id: &str) -> NotifyResult;
    /// Indexes or reindexes a series.
    async fn index_series(&self, series: &Series) -> NotifyResult;
    /// Removes a series from the index.
    async fn delete_series(&self, id: &str) -> NotifyResult;
}

/// Change event sink (server-sent events, webhooks).
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Publishes one event.
    async fn emit(&self, event: StoreEvent) -> NotifyResult;
}

/// Cleanup of transcoded audio derived from a book.
#[async_trait]
pub trait TranscodeDeleter: Send + Sync {
    /// Removes every transcode of the book.
    async fn delete_transcodes_for_book(&self, book_id: &str) -> NotifyResult;
}

/// Denormalizes a book before it is handed to search and events.
pub trait Enricher: Send + Sync {
    /// Resolves contributor and series names.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced records cannot be read; the
    /// notifier then falls back to [`BookView::bare`].
    fn enrich_book(&self, book: &Book) -> crate::error::Result<BookView>;
}

/// Search indexer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSearchIndexer;

#[async_trait]
impl SearchIndexer for NoopSearchIndexer {
    async fn index_book(&self, _book: &BookView) -> NotifyResult {
        Ok(())
    }
    async fn delete_book(&self, _id: &str) -> NotifyResult {
        Ok(())
    }
    async fn index_contributor(&self, _contributor: &Contributor) -> NotifyResult {
        Ok(())
    }
    async fn delete_contributor(&self, _id: &str) -> NotifyResult {
        Ok(())
    }
    async fn index_series(&self, _series: &Series) -> NotifyResult {
        Ok(())
    }
    async fn delete_series(&self, _id: &str) -> NotifyResult {
        Ok(())
    }
}

/// Event emitter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventEmitter;

#[async_trait]
impl EventEmitter for NoopEventEmitter {
    async fn emit(&self, _event: StoreEvent) -> NotifyResult {
        Ok(())
    }
}

/// Transcode deleter that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranscodeDeleter;

#[async_trait]
impl TranscodeDeleter for NoopTranscodeDeleter {
    async fn delete_transcodes_for_book(&self, _book_id: &str) -> NotifyResult {
        Ok(())
    }
}

/// Event emitter backed by a Tokio broadcast channel.
///
/// Events published with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct ChannelEventEmitter {
    sender: broadcast::Sender<StoreEvent>,
}

impl ChannelEventEmitter {
    /// Creates an emitter buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventEmitter for ChannelEventEmitter {
    async fn emit(&self, event: StoreEvent) -> NotifyResult {
        // No receivers is not a failure.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Resolves names from the store's own records.
#[derive(Clone)]
pub struct StoreEnricher {
    engine: StorageEngine,
}

impl StoreEnricher {
    /// Creates an enricher reading from `engine`.
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }
}

impl Enricher for StoreEnricher {
    fn enrich_book(&self, book: &Book) -> crate::error::Result<BookView> {
        let txn = self.engine.read()?;
        enrich_with(&txn, book)
    }
}

fn enrich_with<R: KvRead>(txn: &R, book: &Book) -> crate::error::Result<BookView> {
    let mut contributors = Vec::with_capacity(book.contributors.len());
    for credit in &book.contributors {
        let canonical: Option<Contributor> = load(txn, &credit.contributor_id)?;
        let name = credit
            .credited_as
            .clone()
            .or_else(|| canonical.map(|c| c.name))
            .unwrap_or_default();
        contributors.push(ContributorCredit {
            contributor_id: credit.contributor_id.clone(),
            name,
            roles: credit.roles.iter().copied().collect(),
        });
    }
    let mut series = Vec::with_capacity(book.series.len());
    for membership in &book.series {
        let canonical: Option<Series> = load(txn, &membership.series_id)?;
        let name = membership
            .credited_as
            .clone()
            .or_else(|| canonical.map(|s| s.name))
            .unwrap_or_default();
        series.push(SeriesCredit {
            series_id: membership.series_id.clone(),
            name,
            sequence: membership.sequence.clone(),
        });
    }
    Ok(BookView { book: book.clone(), contributors, series, enriched: true })
}

// ============================================================================
// Dispatch
// ============================================================================

/// Dispatches post-commit side effects to the collaborators.
#[derive(Clone)]
pub struct Notifier {
    search: Arc<dyn SearchIndexer>,
    events: Arc<dyn EventEmitter>,
    transcodes: Arc<dyn TranscodeDeleter>,
    enricher: Option<Arc<dyn Enricher>>,
    timeout: Duration,
}

impl Notifier {
    /// A notifier whose collaborators all do nothing.
    pub fn noop(config: &NotifierConfig) -> Self {
        Self {
            search: Arc::new(NoopSearchIndexer),
            events: Arc::new(NoopEventEmitter),
            transcodes: Arc::new(NoopTranscodeDeleter),
            enricher: None,
            timeout: config.timeout,
        }
    }

    /// Replaces the search indexer.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn SearchIndexer>) -> Self {
        self.search = search;
        self
    }

    /// Replaces the event emitter.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the transcode deleter.
    #[must_use]
    pub fn with_transcodes(mut self, transcodes: Arc<dyn TranscodeDeleter>) -> Self {
        self.transcodes = transcodes;
        self
    }

    /// Sets the enricher applied to books before dispatch.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    fn view(&self, book: Book) -> BookView {
        let Some(enricher) = &self.enricher else {
            return BookView::bare(book);
        };
        match enricher.enrich_book(&book) {
            Ok(view) => view,
            Err(e) => {
                warn!(book_id = %book.id, error = %e, "Book enrichment failed, sending bare record");
                BookView::bare(book)
            },
        }
    }

    fn spawn<F>(&self, task: &'static str, fut: F)
    where
        F: Future<Output = NotifyResult> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(task, "No async runtime, skipping side effect");
            return;
        };
        let timeout = self.timeout;
        handle.spawn(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!(task, error = %e, "Side effect failed"),
                Err(_) => {
                    warn!(task, timeout_ms = timeout.as_millis() as u64, "Side effect timed out")
                },
            }
        });
    }

    fn emit(&self, event: StoreEvent) {
        let events = Arc::clone(&self.events);
        self.spawn("emit", async move { events.emit(event).await });
    }

    /// A book was created or updated.
    pub fn book_changed(&self, book: Book, created: bool) {
        let view = self.view(book);
        let search = Arc::clone(&self.search);
        let indexed = view.clone();
        self.spawn("search.index_book", async move { search.index_book(&indexed).await });
        let view = Box::new(view);
        self.emit(if created { StoreEvent::BookCreated(view) } else { StoreEvent::BookUpdated(view) });
    }

    /// A book was soft-deleted.
    pub fn book_deleted(&self, id: &str) {
        let search = Arc::clone(&self.search);
        let search_id = id.to_string();
        self.spawn("search.delete_book", async move { search.delete_book(&search_id).await });
        let transcodes = Arc::clone(&self.transcodes);
        let book_id = id.to_string();
        self.spawn("transcode.delete", async move {
            transcodes.delete_transcodes_for_book(&book_id).await
        });
        self.emit(StoreEvent::BookDeleted { id: id.to_string() });
    }

    /// A contributor was created or updated.
    pub fn contributor_changed(&self, contributor: Contributor) {
        let search = Arc::clone(&self.search);
        let indexed = contributor.clone();
        self.spawn("search.index_contributor", async move {
            search.index_contributor(&indexed).await
        });
        self.emit(StoreEvent::ContributorUpdated(contributor));
    }

    /// A contributor was soft-deleted.
    pub fn contributor_deleted(&self, id: &str) {
        let search = Arc::clone(&self.search);
        let search_id = id.to_string();
        self.spawn("search.delete_contributor", async move {
            search.delete_contributor(&search_id).await
        });
        self.emit(StoreEvent::ContributorDeleted { id: id.to_string() });
    }

    /// A series was created or updated.
    pub fn series_changed(&self, series: Series) {
        let search = Arc::clone(&self.search);
        let indexed = series.clone();
        self.spawn("search.index_series", async move { search.index_series(&indexed).await });
        self.emit(StoreEvent::SeriesUpdated(series));
    }

    /// A series was soft-deleted.
    pub fn series_deleted(&self, id: &str) {
        let search = Arc::clone(&self.search);
        let search_id = id.to_string();
        self.spawn("search.delete_series", async move { search.delete_series(&search_id).await });
        self.emit(StoreEvent::SeriesDeleted { id: id.to_string() });
    }

    /// A collection changed.
    pub fn collection_changed(&self, collection: Collection) {
        self.emit(StoreEvent::CollectionUpdated(collection));
    }

    /// A collection was soft-deleted.
    pub fn collection_deleted(&self, id: &str) {
        self.emit(StoreEvent::CollectionDeleted { id: id.to_string() });
    }

    /// Publishes an arbitrary event.
    pub fn publish(&self, event: StoreEvent) {
        self.emit(event);
    }
}
