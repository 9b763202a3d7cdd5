//! Shared test utilities for Folio crates.
//!
//! - [`TestDir`] - Managed temporary directory for on-disk stores
//! - [`assert_eventually`] - Poll a condition until it holds or a timeout passes
//! - [`fixtures`] - Records and a fast test configuration
//! - [`strategies`] - Proptest generators for ids, paths, names and timestamps

#![deny(unsafe_code)]

mod test_dir;
pub use test_dir::TestDir;

mod assertions;
pub use assertions::assert_eventually;

pub mod fixtures;
pub use fixtures::{fixed_time, test_config};

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    // ============================================
    // TestDir tests
    // ============================================

    #[test]
    fn test_dir_creates_temp_directory() {
        let dir = TestDir::new();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_dir_cleanup_on_drop() {
        let path = {
            let dir = TestDir::new();
            std::fs::write(dir.join("folio.redb"), "data").expect("write file");
            dir.path().to_path_buf()
        };
        assert!(!path.exists(), "temp directory should be removed on drop");
    }

    // ============================================
    // assert_eventually tests
    // ============================================

    #[tokio::test]
    async fn test_assert_eventually_sees_late_change() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.store(true, Ordering::SeqCst);
        });
        assert!(assert_eventually(Duration::from_secs(1), || flag.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn test_assert_eventually_timeout() {
        assert!(!assert_eventually(Duration::from_millis(30), || false).await);
    }

    // ============================================
    // Fixture tests
    // ============================================

    #[test]
    fn test_config_is_valid() {
        test_config().validate().expect("test config validates");
    }

    #[test]
    fn test_book_fixture_has_one_file_per_inode() {
        let book = fixtures::book("b1", "lib", &[3, 4]);
        assert_eq!(book.inodes(), vec![3, 4]);
        assert_eq!(book.path, "/lib/b1");
    }
}
