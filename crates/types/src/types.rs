//! Record definitions for the Folio library core.
//!
//! Records are plain serde values. The store owns their persisted form and
//! hands callers copies; nothing here knows how a record is keyed or indexed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Generates a fresh random record identifier.
///
/// Identifiers are hyphenated UUID v4 strings. They never contain `:` or `%`,
/// so they pass through key escaping unchanged.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Libraries
// ============================================================================

/// Library-wide visibility policy for books outside a user's collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Uncollected books are visible to every user.
    #[default]
    Open,
    /// Only books in a collection the user can access are visible.
    Restricted,
}

/// A library root: a set of scanned paths and the access policy for its books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// User who administers the library.
    pub owner_id: String,
    /// Visibility policy.
    pub access_mode: AccessMode,
    /// Filesystem roots scanned into this library.
    pub paths: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Library {
    /// Creates an open-mode library with no scan paths.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            access_mode: AccessMode::Open,
            paths: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Books
// ============================================================================

/// A single audio file belonging to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFile {
    /// Filesystem inode number. Zero means unknown and is never indexed.
    pub inode: u64,
    /// Absolute file path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Playback duration in milliseconds.
    pub duration_ms: u64,
}

impl AudioFile {
    /// Creates an audio file entry with unknown size and duration.
    pub fn new(inode: u64, path: impl Into<String>) -> Self {
        Self { inode, path: path.into(), size: 0, duration_ms: 0 }
    }
}

/// The part a contributor played in a book.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ContributorRole {
    /// Wrote the text.
    Author,
    /// Performed the audio.
    Narrator,
    /// Edited the text.
    Editor,
    /// Translated the text.
    Translator,
}

/// Join record linking a book to a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookContributor {
    /// Canonical contributor identity.
    pub contributor_id: String,
    /// Roles the contributor played on this book.
    pub roles: BTreeSet<ContributorRole>,
    /// Original byline when it differs from the canonical contributor's name.
    pub credited_as: Option<String>,
}

impl BookContributor {
    /// Creates a join record with the given roles and no byline override.
    pub fn new(
        contributor_id: impl Into<String>,
        roles: impl IntoIterator<Item = ContributorRole>,
    ) -> Self {
        Self {
            contributor_id: contributor_id.into(),
            roles: roles.into_iter().collect(),
            credited_as: None,
        }
    }

    /// Sets the byline override.
    #[must_use]
    pub fn credited_as(mut self, name: impl Into<String>) -> Self {
        self.credited_as = Some(name.into());
        self
    }
}

/// Join record linking a book to a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSeries {
    /// Canonical series identity.
    pub series_id: String,
    /// Position within the series ("1", "2.5", ...).
    pub sequence: Option<String>,
    /// Original series name when it differs from the canonical series' name.
    pub credited_as: Option<String>,
}

impl BookSeries {
    /// Creates a join record at the given position.
    pub fn new(series_id: impl Into<String>, sequence: Option<&str>) -> Self {
        Self { series_id: series_id.into(), sequence: sequence.map(str::to_string), credited_as: None }
    }

    /// Sets the series name override.
    #[must_use]
    pub fn credited_as(mut self, name: impl Into<String>) -> Self {
        self.credited_as = Some(name.into());
        self
    }
}

/// An audiobook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier.
    pub id: String,
    /// Owning library.
    pub library_id: String,
    /// Title.
    pub title: String,
    /// Directory or file path the book was scanned from. Unique among live books.
    pub path: String,
    /// Audio files in playback order.
    pub audio_files: Vec<AudioFile>,
    /// Contributor join records.
    pub contributors: Vec<BookContributor>,
    /// Series join records.
    pub series: Vec<BookSeries>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time; drives the updated-at delta index.
    pub updated_at: DateTime<Utc>,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Creates a live book with no files or relationships.
    pub fn new(
        id: impl Into<String>,
        library_id: impl Into<String>,
        title: impl Into<String>,
        path: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            library_id: library_id.into(),
            title: title.into(),
            path: path.into(),
            audio_files: Vec::new(),
            contributors: Vec::new(),
            series: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Positive inode numbers of this book's audio files.
    pub fn inodes(&self) -> Vec<u64> {
        self.audio_files.iter().map(|f| f.inode).filter(|inode| *inode > 0).collect()
    }

    /// Referenced contributor IDs.
    pub fn contributor_ids(&self) -> Vec<String> {
        self.contributors.iter().map(|c| c.contributor_id.clone()).collect()
    }

    /// Referenced series IDs.
    pub fn series_ids(&self) -> Vec<String> {
        self.series.iter().map(|s| s.series_id.clone()).collect()
    }

    /// Whether the book is tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ============================================================================
// Contributors and series
// ============================================================================

/// A person credited on books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Unique identifier.
    pub id: String,
    /// Canonical display name.
    pub name: String,
    /// Sort key ("King, Stephen").
    pub sort_name: Option<String>,
    /// Former display names of identities merged into this one.
    pub aliases: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contributor {
    /// Creates a live contributor without aliases.
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sort_name: None,
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A named series of books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    /// Unique identifier.
    pub id: String,
    /// Canonical display name.
    pub name: String,
    /// Former names of series merged into this one.
    pub aliases: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Series {
    /// Creates a live series without aliases.
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

// ============================================================================
// Collections and shares
// ============================================================================

/// A user-curated, ordered set of books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier.
    pub id: String,
    /// Library the collection belongs to.
    pub library_id: String,
    /// Owning user.
    pub owner_id: String,
    /// Display name.
    pub name: String,
    /// Member books in display order.
    pub book_ids: Vec<String>,
    /// Staging collection: members are hidden from every user.
    pub is_inbox: bool,
    /// Membership grants visibility of the whole non-inbox library.
    pub global_access: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// Creates an ordinary, empty collection.
    pub fn new(
        id: impl Into<String>,
        library_id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            library_id: library_id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            book_ids: Vec::new(),
            is_inbox: false,
            global_access: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Access level granted by a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// May list and play member books.
    Read,
    /// May also add and remove member books.
    Write,
}

/// Grant of a collection to a user other than its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionShare {
    /// Unique identifier.
    pub id: String,
    /// Shared collection.
    pub collection_id: String,
    /// Recipient.
    pub user_id: String,
    /// User who created the share.
    pub shared_by: String,
    /// Granted access level.
    pub permission: Permission,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Users and sessions
// ============================================================================

/// An account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: String,
    /// Login name, unique case-insensitively.
    pub username: String,
    /// Email, unique case-insensitively.
    pub email: String,
    /// Name shown in clients.
    pub display_name: String,
    /// Server administrator.
    pub is_admin: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A refresh-token session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: String,
    /// Session owner.
    pub user_id: String,
    /// Hash of the refresh token; the token itself is never stored.
    pub refresh_token_hash: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// End of the session's lifetime.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session's lifetime has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// Tags
// ============================================================================

/// A free-form label attached to books. Tags are administrative and are
/// hard deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier.
    pub id: String,
    /// URL-safe unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
