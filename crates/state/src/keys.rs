//! Keyspace codec.
//!
//! Every record and index entry lives in one byte-ordered keyspace. Key
//! families:
//!
//! ```text
//! {type}:{id}                                      primary record
//! idx:{type}:{relation}:{part}[:{part}...]         secondary index / edge
//! idx:{type}:updated_at:{timestamp}:{type}:{id}    delta index
//! ```
//!
//! Variable components are escaped (`%` → `%25`, `:` → `%3A`) so that every
//! builder is injective and a `:`-terminated prefix never matches a longer
//! component. Timestamps are rendered at a fixed width of 30 characters so
//! byte order equals chronological order.
//!
//! These prefixes are a persisted schema: renaming one or reordering the
//! parts of a composite key requires rewriting stored data.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

/// Root of every secondary index key.
pub const INDEX_ROOT: &str = "idx";

/// Width of a rendered timestamp: `YYYY-MM-DDTHH:MM:SS.NNNNNNNNNZ`.
pub const TIMESTAMP_LEN: usize = 30;

/// Record types with a primary key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    /// `book:{id}`
    Book,
    /// `contributor:{id}`
    Contributor,
    /// `series:{id}`
    Series,
    /// `collection:{id}`
    Collection,
    /// `share:{id}`
    Share,
    /// `user:{id}`
    User,
    /// `session:{id}`
    Session,
    /// `tag:{id}`
    Tag,
    /// `library:{id}`
    Library,
}

impl EntityType {
    /// Key prefix segment for this type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Contributor => "contributor",
            Self::Series => "series",
            Self::Collection => "collection",
            Self::Share => "share",
            Self::User => "user",
            Self::Session => "session",
            Self::Tag => "tag",
            Self::Library => "library",
        }
    }

    /// Parses a key prefix segment.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "book" => Self::Book,
            "contributor" => Self::Contributor,
            "series" => Self::Series,
            "collection" => Self::Collection,
            "share" => Self::Share,
            "user" => Self::User,
            "session" => Self::Session,
            "tag" => Self::Tag,
            "library" => Self::Library,
            _ => return None,
        })
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Component escaping
// ============================================================================

/// Escapes a variable key component.
pub fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains([':', '%']) {
        return Cow::Borrowed(component);
    }
    let mut out = String::with_capacity(component.len() + 4);
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Reverses [`escape`]. Returns `None` for malformed escapes.
pub fn unescape(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "3A" => out.push(':'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

// ============================================================================
// Primary keys
// ============================================================================

/// Primary key for a record.
///
/// Pattern: `{type}:{id}`
pub fn primary_key(entity: EntityType, id: &str) -> Vec<u8> {
    format!("{}:{}", entity.as_str(), escape(id)).into_bytes()
}

/// Prefix covering every primary key of a type.
///
/// Pattern: `{type}:`
pub fn primary_prefix(entity: EntityType) -> Vec<u8> {
    format!("{}:", entity.as_str()).into_bytes()
}

/// Parses the ID out of a primary key of the given type.
pub fn parse_primary_key(entity: EntityType, key: &[u8]) -> Option<String> {
    let key = std::str::from_utf8(key).ok()?;
    let id = key.strip_prefix(entity.as_str())?.strip_prefix(':')?;
    unescape(id)
}

// ============================================================================
// Index keys
// ============================================================================

/// Index key for a family.
///
/// Pattern: `idx:{type}:{relation}:{part}:{part}...`
pub fn index_key(entity: EntityType, relation: &str, parts: &[&str]) -> Vec<u8> {
    let mut key = format!("{INDEX_ROOT}:{}:{relation}", entity.as_str());
    for part in parts {
        key.push(':');
        key.push_str(&escape(part));
    }
    key.into_bytes()
}

/// Prefix covering every index key that starts with the given parts.
///
/// Pattern: `idx:{type}:{relation}:{part}:...:` (always `:`-terminated)
pub fn index_prefix(entity: EntityType, relation: &str, parts: &[&str]) -> Vec<u8> {
    let mut key = index_key(entity, relation, parts);
    key.push(b':');
    key
}

/// Returns the unescaped component following `prefix` in `key`.
///
/// Used to read the trailing ID out of edge keys such as
/// `idx:contributor:book:{contributor}:{book}`.
pub fn trailing_component(key: &[u8], prefix: &[u8]) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let rest = std::str::from_utf8(rest).ok()?;
    if rest.contains(':') {
        return None;
    }
    unescape(rest)
}

/// Splits the unescaped `:`-separated components following `prefix`.
pub fn split_components(key: &[u8], prefix: &[u8]) -> Option<Vec<String>> {
    let rest = std::str::from_utf8(key.strip_prefix(prefix)?).ok()?;
    rest.split(':').map(unescape).collect()
}

/// Inode key component, zero-padded so keys sort numerically.
pub fn inode_component(inode: u64) -> String {
    format!("{inode:020}")
}

/// Smallest byte string greater than every key starting with `prefix`.
///
/// Returns `None` when no such bound exists (empty or all-`0xFF` prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

// ============================================================================
// Timestamp keys
// ============================================================================

/// Renders a timestamp at fixed width: `YYYY-MM-DDTHH:MM:SS.NNNNNNNNNZ`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

/// Parses a timestamp rendered by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != TIMESTAMP_LEN {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok().map(|ts| ts.with_timezone(&Utc))
}

/// Delta index key.
///
/// Pattern: `{prefix}{timestamp}:{type}:{id}`
pub fn timestamp_key(prefix: &[u8], ts: DateTime<Utc>, entity: EntityType, id: &str) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(
        format!("{}:{}:{}", format_timestamp(ts), entity.as_str(), escape(id)).as_bytes(),
    );
    key
}

/// Lower bound for scanning delta entries at or after `ts`.
pub fn timestamp_seek_key(prefix: &[u8], ts: DateTime<Utc>) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(format_timestamp(ts).as_bytes());
    key
}

/// Decoded components of a delta index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampKey {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Record type.
    pub entity_type: EntityType,
    /// Record ID.
    pub entity_id: String,
}

/// Decodes a delta index key.
///
/// The timestamp itself contains `:`, so the fixed-width field is skipped
/// before splitting the remainder into type and ID.
pub fn decode_timestamp_key(prefix: &[u8], key: &[u8]) -> Option<TimestampKey> {
    let rest = std::str::from_utf8(key.strip_prefix(prefix)?).ok()?;
    let ts = rest.get(..TIMESTAMP_LEN)?;
    let tail = rest.get(TIMESTAMP_LEN..)?.strip_prefix(':')?;
    let (entity_type, id) = tail.split_once(':')?;
    Some(TimestampKey {
        timestamp: parse_timestamp(ts)?,
        entity_type: EntityType::parse(entity_type)?,
        entity_id: unescape(id)?,
    })
}

// ============================================================================
// Family key builders
// ============================================================================

/// Key builders for book index families.
pub struct BookKeys;

impl BookKeys {
    /// Unique live path lookup.
    ///
    /// Pattern: `idx:book:path:{path}` → book_id
    pub fn path(path: &str) -> Vec<u8> {
        index_key(EntityType::Book, "path", &[path])
    }

    /// Live inode lookup.
    ///
    /// Pattern: `idx:book:inode:{inode:020}` → book_id
    pub fn inode(inode: u64) -> Vec<u8> {
        index_key(EntityType::Book, "inode", &[&inode_component(inode)])
    }

    /// Marker for a live book with no collection membership.
    ///
    /// Pattern: `idx:book:uncollected:{library_id}:{book_id}`
    pub fn uncollected(library_id: &str, book_id: &str) -> Vec<u8> {
        index_key(EntityType::Book, "uncollected", &[library_id, book_id])
    }

    /// Prefix over a library's uncollected markers.
    pub fn uncollected_prefix(library_id: &str) -> Vec<u8> {
        index_prefix(EntityType::Book, "uncollected", &[library_id])
    }
}

/// Key builders for name and alias lookups of contributors and series.
pub struct NameKeys;

impl NameKeys {
    /// Normalized lookup form of a display name.
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Pattern: `idx:{type}:name:{normalized}:{id}`
    pub fn name(entity: EntityType, name: &str, id: &str) -> Vec<u8> {
        index_key(entity, "name", &[&Self::normalize(name), id])
    }

    /// Prefix over every record currently named `name`.
    pub fn name_prefix(entity: EntityType, name: &str) -> Vec<u8> {
        index_prefix(entity, "name", &[&Self::normalize(name)])
    }

    /// Pattern: `idx:{type}:alias:{normalized}:{id}`
    pub fn alias(entity: EntityType, alias: &str, id: &str) -> Vec<u8> {
        index_key(entity, "alias", &[&Self::normalize(alias), id])
    }

    /// Prefix over every record carrying `alias`.
    pub fn alias_prefix(entity: EntityType, alias: &str) -> Vec<u8> {
        index_prefix(entity, "alias", &[&Self::normalize(alias)])
    }
}

/// Key builders for collection and library families.
pub struct CollectionKeys;

impl CollectionKeys {
    /// Pattern: `idx:collection:owner:{user_id}:{collection_id}`
    pub fn owner(user_id: &str, collection_id: &str) -> Vec<u8> {
        index_key(EntityType::Collection, "owner", &[user_id, collection_id])
    }

    /// Prefix over a user's owned collections.
    pub fn owner_prefix(user_id: &str) -> Vec<u8> {
        index_prefix(EntityType::Collection, "owner", &[user_id])
    }

    /// Pattern: `idx:library:inbox:{library_id}` → collection_id
    pub fn inbox(library_id: &str) -> Vec<u8> {
        index_key(EntityType::Library, "inbox", &[library_id])
    }

    /// Pattern: `idx:library:book:{library_id}:{book_id}`
    pub fn library_book(library_id: &str, book_id: &str) -> Vec<u8> {
        index_key(EntityType::Library, "book", &[library_id, book_id])
    }

    /// Prefix over a library's books.
    pub fn library_book_prefix(library_id: &str) -> Vec<u8> {
        index_prefix(EntityType::Library, "book", &[library_id])
    }
}

/// Prefixes of the delta sync indexes.
pub struct DeltaKeys;

impl DeltaKeys {
    /// Pattern: `idx:{type}:updated_at:`
    pub fn updated(entity: EntityType) -> Vec<u8> {
        index_prefix(entity, "updated_at", &[])
    }

    /// Pattern: `idx:{type}:deleted_at:`
    pub fn deleted(entity: EntityType) -> Vec<u8> {
        index_prefix(entity, "deleted_at", &[])
    }
}

/// Key builders for tag families.
pub struct TagKeys;

impl TagKeys {
    /// Pattern: `idx:tag:slug:{slug}` → tag_id
    pub fn slug(slug: &str) -> Vec<u8> {
        index_key(EntityType::Tag, "slug", &[slug])
    }
}
