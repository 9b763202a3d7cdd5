//! Buffered bulk writes for library scans.
//!
//! A [`BatchWriter`] collects upserts and commits them together in one write
//! transaction, either when `batch_size` items are pending or on an
//! explicit [`BatchWriter::flush`]. Nothing is durable before the flush: a
//! crash, a failed flush or dropping the writer loses the buffered items, so
//! only re-runnable imports should use it.

use folio_types::{Book, Contributor, Series};

use crate::entity::load_live;
use crate::error::Result;
use crate::store::Store;
use crate::store::identity::Identity;

/// One buffered upsert.
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// Create or replace a book.
    Book(Box<Book>),
    /// Create or replace a contributor.
    Contributor(Contributor),
    /// Create or replace a series.
    Series(Series),
}

/// Buffers upserts against a store.
pub struct BatchWriter<'a> {
    store: &'a Store,
    batch_size: usize,
    pending: Vec<BatchItem>,
}

impl Store {
    /// Starts a batch using the configured batch size.
    pub fn batch_writer(&self) -> BatchWriter<'_> {
        BatchWriter::new(self, self.config().batch.batch_size)
    }
}

impl<'a> BatchWriter<'a> {
    /// Creates a writer that flushes every `batch_size` items.
    pub fn new(store: &'a Store, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self { store, batch_size, pending: Vec::with_capacity(batch_size) }
    }

    /// Number of buffered items.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffers an item, flushing if the batch is full. Returns the number
    /// of items committed by that flush, zero if none happened.
    ///
    /// # Errors
    ///
    /// Returns the error of the triggered flush.
    pub fn push(&mut self, item: BatchItem) -> Result<usize> {
        self.pending.push(item);
        if self.pending.len() >= self.batch_size {
            return self.flush();
        }
        Ok(0)
    }

    /// Buffers a book upsert.
    ///
    /// # Errors
    ///
    /// Returns the error of a triggered flush.
    pub fn put_book(&mut self, book: Book) -> Result<usize> {
        self.push(BatchItem::Book(Box::new(book)))
    }

    /// Buffers a contributor upsert.
    ///
    /// # Errors
    ///
    /// Returns the error of a triggered flush.
    pub fn put_contributor(&mut self, contributor: Contributor) -> Result<usize> {
        self.push(BatchItem::Contributor(contributor))
    }

    /// Buffers a series upsert.
    ///
    /// # Errors
    ///
    /// Returns the error of a triggered flush.
    pub fn put_series(&mut self, series: Series) -> Result<usize> {
        self.push(BatchItem::Series(series))
    }

    /// Commits every buffered item in one transaction and returns how many
    /// were written.
    ///
    /// Items apply in push order, so later items see earlier ones. The
    /// buffer is emptied whether or not the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns the first item's error; nothing in the batch is committed.
    pub fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let items = std::mem::take(&mut self.pending);
        let store = self.store;

        let result = store.write("batch.flush", |txn| {
            let now = store.now();
            let mut books = Vec::new();
            let mut contributors = Vec::new();
            let mut series = Vec::new();
            for item in &items {
                match item {
                    BatchItem::Book(book) => {
                        let change = if load_live::<Book, _>(&*txn, &book.id)?.is_some() {
                            store.update_book_in(txn, book, now)?
                        } else {
                            store.create_book_in(txn, book, now)?
                        };
                        books.push(change);
                    },
                    BatchItem::Contributor(contributor) => {
                        contributors.push(upsert_identity(store, txn, contributor)?);
                    },
                    BatchItem::Series(s) => {
                        series.push(upsert_identity(store, txn, s)?);
                    },
                }
            }
            Ok((books, contributors, series))
        });

        let (books, contributors, series) = match result {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(items = items.len(), error = %e, "Batch flush failed; batch discarded");
                return Err(e);
            },
        };

        let written = books.len() + contributors.len() + series.len();
        tracing::debug!(written, "Batch flushed");
        for contributor in contributors {
            Contributor::notify_changed(store.notifier(), contributor);
        }
        for s in series {
            Series::notify_changed(store.notifier(), s);
        }
        store.finish_book_changes(books);
        Ok(written)
    }
}

fn upsert_identity<T: Identity>(store: &Store, txn: &mut crate::engine::WriteTxn, record: &T) -> Result<T> {
    if load_live::<T, _>(&*txn, record.id())?.is_some() {
        store.update_identity_in(txn, record)
    } else {
        store.create_identity_in(txn, record)
    }
}

impl Drop for BatchWriter<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(pending = self.pending.len(), "Batch writer dropped with unflushed items");
        }
    }
}
