//! Proptest strategies for Folio records and key material.
//!
//! # Usage
//!
//! ```no_run
//! use folio_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn ids_are_unique(ids in strategies::arb_id_set(1..20)) {
//!         prop_assert!(!ids.is_empty());
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::ops::Range;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

/// A record identifier of 1-16 characters from `[a-z0-9-]`.
pub fn arb_id() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,15}"
}

/// Distinct identifiers; the set size is drawn from `size`.
pub fn arb_id_set(size: Range<usize>) -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set(arb_id(), size)
}

/// A display name, including the separator and escape characters the
/// keyspace has to escape.
pub fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[A-Z][a-z]{1,10}( [A-Z][a-z]{1,10}){0,2}",
        1 => "[A-Za-z:% ]{1,20}",
    ]
}

/// An absolute filesystem path with 1-4 components, which may contain `:`.
pub fn arb_path() -> impl Strategy<Value = String> {
    proptest::collection::vec("[A-Za-z0-9 :._-]{1,12}", 1..5)
        .prop_map(|parts| format!("/{}", parts.join("/")))
}

/// Distinct positive inode numbers.
pub fn arb_inodes(size: Range<usize>) -> impl Strategy<Value = BTreeSet<u64>> {
    proptest::collection::btree_set(1u64..1_000_000, size)
}

/// A timestamp between 2020-01-01 and 2030-01-01 with millisecond precision.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800_000i64..1_893_456_000_000i64)
        .prop_map(|millis| Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
}

/// Arbitrary key bytes for cursor encoding.
pub fn arb_key_bytes() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}
