//! Temporary directory management for tests.
//!
//! [`TestDir`] wraps [`tempfile::TempDir`] for on-disk store tests.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory removed when dropped.
///
/// # Example
///
/// ```
/// use folio_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let db_path = dir.join("folio.redb");
/// assert!(db_path.starts_with(dir.path()));
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner = TempDir::new().expect("failed to create temp directory");
        Self { inner }
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Joins a relative path onto the directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
