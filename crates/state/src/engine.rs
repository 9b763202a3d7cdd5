//! redb storage engine wrapper.
//!
//! Provides a thin wrapper around redb with:
//! - Database lifecycle management (file-backed and in-memory)
//! - One byte-ordered table holding every primary record and index entry
//! - Snapshot read transactions ([`ReadTxn`]) and atomic write transactions
//!   ([`WriteTxn`]) sharing the [`KvRead`] query surface
//!
//! Dropping a [`WriteTxn`] without calling [`WriteTxn::commit`] aborts it, so
//! an early `?` return leaves the previous state untouched.

use std::path::Path;
use std::sync::Arc;

use folio_types::ErrorCode;
use folio_types::config::StorageConfig;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition};
use snafu::{ResultExt, Snafu};

use crate::keys::prefix_end;

/// The single ordered keyspace.
const FOLIO: TableDefinition<&[u8], &[u8]> = TableDefinition::new("folio");

/// Error context for storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("Failed to open database at {path}: {source}"))]
    Open { path: String, source: redb::DatabaseError },

    #[snafu(display("Failed to begin transaction: {source}"))]
    Transaction { source: redb::TransactionError },

    #[snafu(display("Failed to open table: {source}"))]
    Table { source: redb::TableError },

    #[snafu(display("Storage operation failed: {source}"))]
    Storage { source: redb::StorageError },

    #[snafu(display("Failed to commit transaction: {source}"))]
    Commit { source: redb::CommitError },
}

impl EngineError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } => ErrorCode::StorageDatabaseOpen,
            Self::Transaction { .. } | Self::Commit { .. } => ErrorCode::StorageTransaction,
            Self::Table { .. } => ErrorCode::StorageTableOperation,
            Self::Storage { source } => match source {
                redb::StorageError::Io(_) => ErrorCode::StorageTableOperation,
                _ => ErrorCode::StorageCorruption,
            },
        }
    }
}

type Result<T> = std::result::Result<T, EngineError>;

/// A key-value pair read from the keyspace.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Storage engine backed by redb.
///
/// Cheap to clone; every clone shares the same database handle.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database>,
}

impl StorageEngine {
    /// Opens or creates a database file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Open`] if the file cannot be opened, or a
    /// transaction error if the keyspace table cannot be initialized.
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size_bytes);
        let db = builder
            .create(path)
            .context(OpenSnafu { path: path.display().to_string() })?;
        Self::initialize(db)
    }

    /// Creates a new in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Open`] if the backend cannot be created.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(OpenSnafu { path: ":memory:".to_string() })?;
        Self::initialize(db)
    }

    /// Creates the keyspace table so read transactions can always open it.
    fn initialize(db: Database) -> Result<Self> {
        let txn = db.begin_write().context(TransactionSnafu)?;
        txn.open_table(FOLIO).context(TableSnafu)?;
        txn.commit().context(CommitSnafu)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Begins a snapshot read transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction or table cannot be opened.
    pub fn read(&self) -> Result<ReadTxn> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(FOLIO).context(TableSnafu)?;
        Ok(ReadTxn { table, _txn: txn })
    }

    /// Begins a write transaction. Blocks while another writer is active.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transaction`] if the transaction cannot begin.
    pub fn write(&self) -> Result<WriteTxn> {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        Ok(WriteTxn { txn })
    }
}

/// Read operations shared by snapshot and write transactions.
///
/// Index maintenance needs to read current index state inside the write
/// transaction it mutates; query paths run the same reads on snapshots.
pub trait KvRead {
    /// Returns the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Returns up to `limit` entries with keys `>= start` that share `prefix`,
    /// in key order.
    fn scan_from(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<Entry>>;

    /// Whether a value is stored under `key`.
    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns every entry under `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        self.scan_from(prefix, prefix, usize::MAX)
    }

    /// Whether any key starts with `prefix`.
    fn has_prefix(&self, prefix: &[u8]) -> Result<bool> {
        Ok(!self.scan_from(prefix, prefix, 1)?.is_empty())
    }
}

fn table_get<T>(table: &T, key: &[u8]) -> Result<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let value = table.get(key).context(StorageSnafu)?;
    Ok(value.map(|guard| guard.value().to_vec()))
}

fn table_scan<T>(table: &T, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut entries = Vec::new();
    if limit == 0 {
        return Ok(entries);
    }
    let start = if start < prefix { prefix } else { start };
    let end = prefix_end(prefix);
    let range = match end.as_deref() {
        Some(end) => table.range(start..end),
        None => table.range(start..),
    }
    .context(StorageSnafu)?;

    for item in range {
        let (key, value) = item.context(StorageSnafu)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.to_vec(), value.value().to_vec()));
        if entries.len() >= limit {
            break;
        }
    }
    Ok(entries)
}

/// Snapshot read transaction.
///
/// Never blocks writers and never observes a partially applied write.
pub struct ReadTxn {
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
    _txn: redb::ReadTransaction,
}

impl KvRead for ReadTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        table_get(&self.table, key)
    }

    fn scan_from(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<Entry>> {
        table_scan(&self.table, prefix, start, limit)
    }
}

/// Atomic write transaction.
///
/// All mutations become visible together on [`WriteTxn::commit`]. Dropping
/// the transaction discards them.
pub struct WriteTxn {
    txn: redb::WriteTransaction,
}

impl WriteTxn {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be opened or the insert fails.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut table = self.txn.open_table(FOLIO).context(TableSnafu)?;
        table.insert(key, value).context(StorageSnafu)?;
        Ok(())
    }

    /// Removes `key`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be opened or the removal fails.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let mut table = self.txn.open_table(FOLIO).context(TableSnafu)?;
        let existed = table.remove(key).context(StorageSnafu)?.is_some();
        Ok(existed)
    }

    /// Makes every mutation durable and visible.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Commit`] if the commit fails; nothing is applied.
    pub fn commit(self) -> Result<()> {
        self.txn.commit().context(CommitSnafu)
    }
}

impl KvRead for WriteTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.txn.open_table(FOLIO).context(TableSnafu)?;
        table_get(&table, key)
    }

    fn scan_from(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<Entry>> {
        let table = self.txn.open_table(FOLIO).context(TableSnafu)?;
        table_scan(&table, prefix, start, limit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let engine = StorageEngine::in_memory().expect("should open");
        let _read = engine.read().expect("should begin read");
        let _write = engine.write().expect("should begin write");
    }

    #[test]
    fn test_open_file_backed() {
        let dir = folio_test_utils::TestDir::new();
        let path = dir.join("folio.redb");
        {
            let engine = StorageEngine::open(&path, &StorageConfig::default()).expect("open");
            let mut txn = engine.write().expect("write");
            txn.put(b"book:1", b"v").expect("put");
            txn.commit().expect("commit");
        }
        let engine = StorageEngine::open(&path, &StorageConfig::default()).expect("reopen");
        let txn = engine.read().expect("read");
        assert_eq!(txn.get(b"book:1").expect("get"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_write_and_read() {
        let engine = StorageEngine::in_memory().expect("should open");

        {
            let mut txn = engine.write().expect("should begin write");
            txn.put(b"test_key", b"test_value").expect("insert");
            txn.commit().expect("commit");
        }

        let txn = engine.read().expect("should begin read");
        let value = txn.get(b"test_key").expect("get");
        assert_eq!(value.as_deref(), Some(&b"test_value"[..]));
    }

    #[test]
    fn test_dropped_write_is_aborted() {
        let engine = StorageEngine::in_memory().expect("open");
        {
            let mut txn = engine.write().expect("write");
            txn.put(b"k", b"v").expect("put");
        }
        let txn = engine.read().expect("read");
        assert!(!txn.exists(b"k").expect("exists"));
    }

    #[test]
    fn test_snapshot_isolation() {
        let engine = StorageEngine::in_memory().expect("open");
        let snapshot = engine.read().expect("read");

        let mut txn = engine.write().expect("write");
        txn.put(b"k", b"v").expect("put");
        txn.commit().expect("commit");

        assert!(!snapshot.exists(b"k").expect("exists"));
        assert!(engine.read().expect("read").exists(b"k").expect("exists"));
    }

    #[test]
    fn test_scan_respects_prefix_start_and_limit() {
        let engine = StorageEngine::in_memory().expect("open");
        let mut txn = engine.write().expect("write");
        for key in ["a:1", "b:1", "b:2", "b:3", "c:1"] {
            txn.put(key.as_bytes(), b"").expect("put");
        }
        txn.commit().expect("commit");

        let txn = engine.read().expect("read");
        let keys = |entries: Vec<Entry>| {
            entries.into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(keys(txn.scan_prefix(b"b:").unwrap()), vec!["b:1", "b:2", "b:3"]);
        assert_eq!(keys(txn.scan_from(b"b:", b"b:2", 10).unwrap()), vec!["b:2", "b:3"]);
        assert_eq!(keys(txn.scan_from(b"b:", b"b:", 1).unwrap()), vec!["b:1"]);
        assert!(txn.scan_prefix(b"d:").unwrap().is_empty());
        assert!(txn.has_prefix(b"c:").unwrap());
    }

    #[test]
    fn test_write_txn_reads_its_own_writes() {
        let engine = StorageEngine::in_memory().expect("open");
        let mut txn = engine.write().expect("write");
        txn.put(b"x:1", b"one").expect("put");
        assert_eq!(txn.get(b"x:1").expect("get"), Some(b"one".to_vec()));
        assert!(txn.delete(b"x:1").expect("delete"));
        assert!(!txn.delete(b"x:1").expect("delete again"));
        assert!(!txn.has_prefix(b"x:").expect("has_prefix"));
    }
}
