//! Record and configuration fixtures.
//!
//! Fixtures use a fixed clock so that tests comparing timestamps do not
//! depend on wall time. Stores stamp their own times on write; the fixture
//! time only fills fields the caller never persists unchanged.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use folio_types::config::{BatchConfig, FolioConfig, PaginationConfig, RetryConfig};
use folio_types::{AudioFile, Book, BookContributor, Collection, ContributorRole, Library, User};

/// 2024-01-01T00:00:00Z.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default()
}

/// Configuration for fast tests: small pages and batches, near-zero retry
/// backoff.
#[must_use]
pub fn test_config() -> FolioConfig {
    FolioConfig {
        pagination: PaginationConfig { default_limit: 10, max_limit: 50 },
        batch: BatchConfig { batch_size: 10 },
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        },
        ..FolioConfig::default()
    }
}

/// A book at `/{library_id}/{id}` with one audio file per inode.
#[must_use]
pub fn book(id: &str, library_id: &str, inodes: &[u64]) -> Book {
    let path = format!("/{library_id}/{id}");
    let mut book = Book::new(id, library_id, id, path.clone(), fixed_time());
    book.audio_files = inodes
        .iter()
        .enumerate()
        .map(|(i, inode)| AudioFile::new(*inode, format!("{path}/{i:02}.m4b")))
        .collect();
    book
}

/// A book crediting `contributor_id` as author.
#[must_use]
pub fn authored_book(id: &str, library_id: &str, contributor_id: &str) -> Book {
    let mut book = book(id, library_id, &[]);
    book.contributors = vec![BookContributor::new(contributor_id, [ContributorRole::Author])];
    book
}

/// An open library owned by `owner_id`.
#[must_use]
pub fn library(id: &str, owner_id: &str) -> Library {
    Library::new(id, id, owner_id, fixed_time())
}

/// An ordinary collection holding `book_ids`.
#[must_use]
pub fn collection(id: &str, library_id: &str, owner_id: &str, book_ids: &[&str]) -> Collection {
    let mut collection = Collection::new(id, library_id, owner_id, id, fixed_time());
    collection.book_ids = book_ids.iter().map(|b| (*b).to_string()).collect();
    collection
}

/// A non-admin user whose username and email derive from `id`.
#[must_use]
pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: id.to_string(),
        email: format!("{id}@example.com"),
        display_name: id.to_string(),
        is_admin: false,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}
