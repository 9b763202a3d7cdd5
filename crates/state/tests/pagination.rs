//! Cursor pagination over stored listings.
//!
//! Walking any listing page by page yields every live item exactly once and
//! in key order, whatever the page size.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::BTreeSet;

use common::{create_library, never, store};
use folio_state::pagination::{decode_cursor, encode_cursor};
use folio_state::{Page, PageParams, Store, StoreError};
use folio_test_utils::{fixtures, strategies};
use folio_types::{AccessMode, Book};
use proptest::prelude::*;

/// Follows `next_cursor` until the listing is exhausted.
fn walk<F>(limit: usize, mut fetch: F) -> Vec<String>
where
    F: FnMut(&PageParams) -> folio_state::Result<Page<Book>>,
{
    let mut params = PageParams::first(limit);
    let mut seen = Vec::new();
    loop {
        let page = fetch(&params).unwrap();
        assert!(page.items.len() <= limit);
        seen.extend(page.items.iter().map(|b| b.id.clone()));
        match page.next_cursor {
            Some(cursor) => {
                assert!(page.has_more);
                params = PageParams::after(limit, cursor);
            },
            None => {
                assert!(!page.has_more);
                break;
            },
        }
    }
    seen
}

fn seeded(book_ids: &BTreeSet<String>, deleted: &BTreeSet<String>) -> Store {
    let store = store();
    for id in book_ids {
        store.create_book(&fixtures::book(id, "lib", &[])).unwrap();
    }
    for id in deleted {
        store.delete_book(id).unwrap();
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_cursor_round_trips(key in strategies::arb_key_bytes()) {
        prop_assert_eq!(decode_cursor(&encode_cursor(&key)).unwrap(), key);
    }

    #[test]
    fn prop_book_listing_is_exhaustive(
        book_ids in strategies::arb_id_set(0..30),
        limit in 1usize..8,
        delete_mask in proptest::collection::vec(any::<bool>(), 30),
    ) {
        let deleted: BTreeSet<String> = book_ids
            .iter()
            .zip(&delete_mask)
            .filter(|(_, d)| **d)
            .map(|(id, _)| id.clone())
            .collect();
        let store = seeded(&book_ids, &deleted);
        let expected: Vec<String> = book_ids.difference(&deleted).cloned().collect();

        let listed = walk(limit, |p| store.list_books(p, &never()));
        prop_assert_eq!(&listed, &expected);

        let in_library = walk(limit, |p| store.library_books("lib", p, &never()));
        prop_assert_eq!(&in_library, &expected);

        let visible = walk(limit, |p| store.paginated_books_for_user("anyone", p, &never()));
        prop_assert_eq!(&visible, &expected);
    }

    #[test]
    fn prop_collection_listing_keeps_member_order(
        book_ids in strategies::arb_id_set(1..20),
        limit in 1usize..6,
    ) {
        let store = seeded(&book_ids, &BTreeSet::new());
        // Reverse order so that member order differs from key order.
        let members: Vec<&str> = book_ids.iter().rev().map(String::as_str).collect();
        store.create_collection(&fixtures::collection("c1", "lib", "u1", &members)).unwrap();

        let listed = walk(limit, |p| store.collection_books("c1", p, &never()));
        let expected: Vec<String> = members.iter().map(|m| (*m).to_string()).collect();
        prop_assert_eq!(listed, expected);
    }
}

#[test]
fn test_user_pages_resume_by_value() {
    let store = store();
    create_library(&store, "lib", AccessMode::Open);
    for id in ["a", "b", "c", "d"] {
        store.create_book(&fixtures::book(id, "lib", &[])).unwrap();
    }
    let first = store.paginated_books_for_user("u1", &PageParams::first(2), &never()).unwrap();
    assert_eq!(common::ids(&first.items), ["a", "b"]);
    assert_eq!(first.total, Some(4));

    // Removing an already returned book does not shift the next page.
    store.delete_book("a").unwrap();
    let cursor = first.next_cursor.expect("more pages");
    let second = store.paginated_books_for_user("u1", &PageParams::after(2, cursor), &never()).unwrap();
    assert_eq!(common::ids(&second.items), ["c", "d"]);
    assert!(!second.has_more);
}

#[test]
fn test_malformed_cursor_is_invalid_input() {
    let store = store();
    let err = store.list_books(&PageParams::after(5, "not base64!"), &never()).expect_err("bad cursor");
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[test]
fn test_limit_is_clamped() {
    let store = store();
    for i in 0..60 {
        store.create_book(&fixtures::book(&format!("b{i:02}"), "lib", &[])).unwrap();
    }
    let max = store.config().pagination.max_limit;
    let page = store.list_books(&PageParams::first(10_000), &never()).unwrap();
    assert_eq!(page.items.len(), max);
    assert!(page.has_more);

    let default = store.list_books(&PageParams::first(0), &never()).unwrap();
    assert_eq!(default.items.len(), store.config().pagination.default_limit);
}
