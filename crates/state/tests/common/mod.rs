//! Shared setup for store integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Once;

use folio_state::Store;
use folio_test_utils::test_config;
use folio_types::{AccessMode, Library};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a test-writer subscriber once per test binary. `RUST_LOG`
/// overrides the default `warn` filter.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry().with(filter).with(fmt::layer().with_test_writer()).try_init();
    });
}

/// An in-memory store with the fast test configuration.
pub fn store() -> Store {
    init_tracing();
    Store::in_memory(test_config()).expect("in-memory store")
}

/// A token that never fires.
pub fn never() -> CancellationToken {
    CancellationToken::new()
}

/// Creates a library with the given policy, owned by `admin`.
pub fn create_library(store: &Store, id: &str, mode: AccessMode) -> Library {
    let mut library = folio_test_utils::fixtures::library(id, "admin");
    library.access_mode = mode;
    store.create_library(&library).expect("create library")
}

/// IDs of books, in the order returned.
pub fn ids(books: &[folio_types::Book]) -> Vec<String> {
    books.iter().map(|b| b.id.clone()).collect()
}
