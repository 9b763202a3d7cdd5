//! Record lifecycle tests through the public store API.
//!
//! Covers creation, lookups through secondary indexes, index diffing on
//! update, idempotent soft deletes and reopening an on-disk store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{never, store};
use folio_state::{PageParams, Store, StoreError};
use folio_test_utils::{TestDir, fixtures, test_config};
use folio_types::{Contributor, Series};

// ============================================================================
// Books
// ============================================================================

#[test]
fn test_book_lookups_follow_updates() {
    let store = store();
    let created = store.create_book(&fixtures::book("b1", "lib", &[11, 12])).unwrap();
    assert!(created.deleted_at.is_none());

    assert_eq!(store.get_book_by_path("/lib/b1").unwrap().id, "b1");
    assert_eq!(store.get_book_by_inode(11).unwrap().id, "b1");
    assert_eq!(store.get_book_by_inode(12).unwrap().id, "b1");

    let mut book = store.get_book("b1").unwrap();
    book.path = "/lib/moved".into();
    book.audio_files = fixtures::book("b1", "lib", &[12, 13]).audio_files;
    let updated = store.update_book(&book).unwrap();
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);

    assert!(store.get_book_by_path("/lib/b1").expect_err("old path").is_not_found());
    assert_eq!(store.get_book_by_path("/lib/moved").unwrap().id, "b1");
    assert!(store.get_book_by_inode(11).expect_err("dropped inode").is_not_found());
    assert_eq!(store.get_book_by_inode(12).unwrap().id, "b1");
    assert_eq!(store.get_book_by_inode(13).unwrap().id, "b1");
}

#[test]
fn test_duplicate_id_and_path_are_rejected() {
    let store = store();
    store.create_book(&fixtures::book("b1", "lib", &[])).unwrap();

    let err = store.create_book(&fixtures::book("b1", "lib", &[])).expect_err("duplicate id");
    assert!(matches!(err, StoreError::AlreadyExists { .. }), "got {err:?}");

    let mut other = fixtures::book("b2", "lib", &[]);
    other.path = "/lib/b1".into();
    let err = store.create_book(&other).expect_err("duplicate path");
    assert!(matches!(err, StoreError::Conflict { ref index, .. } if index == "path"), "got {err:?}");
    assert!(store.get_book("b2").expect_err("nothing written").is_not_found());
}

#[test]
fn test_inode_moves_to_last_writer() {
    let store = store();
    store.create_book(&fixtures::book("b1", "lib", &[7])).unwrap();
    store.create_book(&fixtures::book("b2", "lib", &[7])).unwrap();
    assert_eq!(store.get_book_by_inode(7).unwrap().id, "b2");

    // Dropping the inode from the earlier owner leaves the new owner's entry.
    let mut b1 = store.get_book("b1").unwrap();
    b1.audio_files.clear();
    store.update_book(&b1).unwrap();
    assert_eq!(store.get_book_by_inode(7).unwrap().id, "b2");
}

#[test]
fn test_delete_book_is_idempotent_and_frees_indexes() {
    let store = store();
    store.create_book(&fixtures::book("b1", "lib", &[5])).unwrap();

    store.delete_book("b1").unwrap();
    store.delete_book("b1").unwrap();
    store.delete_book("never-existed").unwrap();

    assert!(store.get_book("b1").expect_err("deleted").is_not_found());
    assert!(store.get_book_by_path("/lib/b1").expect_err("path released").is_not_found());
    assert!(store.get_book_by_inode(5).expect_err("inode released").is_not_found());
    assert!(store.list_books(&PageParams::first(10), &never()).unwrap().items.is_empty());

    // The path is free again; the ID stays reserved by the tombstone.
    let mut again = fixtures::book("b2", "lib", &[5]);
    again.path = "/lib/b1".into();
    store.create_book(&again).unwrap();
    let err = store.create_book(&fixtures::book("b1", "lib", &[])).expect_err("tombstoned id");
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[test]
fn test_update_missing_book_is_not_found() {
    let store = store();
    let err = store.update_book(&fixtures::book("ghost", "lib", &[])).expect_err("missing");
    assert!(err.is_not_found());
}

// ============================================================================
// Contributors and series
// ============================================================================

#[test]
fn test_contributor_lookup_by_name_and_alias() {
    let store = store();
    let mut king = Contributor::new("c1", "Stephen King", fixtures::fixed_time());
    king.aliases = vec!["Richard Bachman".into()];
    store.create_contributor(&king).unwrap();

    assert_eq!(store.contributor_by_name("STEPHEN KING").unwrap().id, "c1");
    assert_eq!(store.contributor_by_name("richard bachman").unwrap().id, "c1");
    assert!(store.contributor_by_name("Unknown").expect_err("absent").is_not_found());

    let mut renamed = store.get_contributor("c1").unwrap();
    renamed.name = "S. King".into();
    store.update_contributor(&renamed).unwrap();
    assert!(store.contributor_by_name("Stephen King").expect_err("old name").is_not_found());
    assert_eq!(store.contributor_by_name("s. king").unwrap().id, "c1");
}

#[test]
fn test_identity_writes_cannot_tombstone() {
    let store = store();
    let since = fixtures::fixed_time();
    let mut hidden = Contributor::new("c1", "Ursula Le Guin", since);
    hidden.deleted_at = Some(since);
    let created = store.create_contributor(&hidden).unwrap();
    assert!(created.deleted_at.is_none());
    assert_eq!(store.get_contributor("c1").unwrap().id, "c1");
    assert_eq!(store.contributor_by_name("ursula le guin").unwrap().id, "c1");
    assert!(store.contributors_deleted_after(since, &never()).unwrap().is_empty());

    let original = store.create_series(&Series::new("s1", "Earthsea", since)).unwrap();
    let mut rewritten = original.clone();
    rewritten.created_at = chrono::Utc::now();
    rewritten.deleted_at = Some(chrono::Utc::now());
    let updated = store.update_series(&rewritten).unwrap();
    assert!(updated.deleted_at.is_none());
    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(store.series_by_name("earthsea").unwrap().id, "s1");
    assert!(store.series_deleted_after(since, &never()).unwrap().is_empty());
    assert_eq!(store.series_updated_after(since, &never()).unwrap().len(), 1);

    // A real delete still reports the removal.
    store.delete_contributor("c1").unwrap();
    assert_eq!(store.contributors_deleted_after(since, &never()).unwrap(), ["c1"]);
}

#[test]
fn test_orphaned_identity_is_cleaned_up() {
    let store = store();
    store.create_contributor(&Contributor::new("c1", "Author", fixtures::fixed_time())).unwrap();
    store.create_book(&fixtures::authored_book("b1", "lib", "c1")).unwrap();

    store.set_book_contributors("b1", Vec::new()).unwrap();
    assert!(store.get_contributor("c1").expect_err("orphan removed").is_not_found());
}

#[test]
fn test_delete_series_unlinks_books() {
    let store = store();
    store.create_series(&Series::new("s1", "Saga", fixtures::fixed_time())).unwrap();
    let mut book = fixtures::book("b1", "lib", &[]);
    book.series = vec![folio_types::BookSeries::new("s1", Some("2"))];
    store.create_book(&book).unwrap();

    store.delete_series("s1").unwrap();
    store.delete_series("s1").unwrap();
    assert!(store.get_book("b1").unwrap().series.is_empty());
    assert!(store.books_by_series("s1", &never()).unwrap().is_empty());
}

// ============================================================================
// Users and sessions
// ============================================================================

#[test]
fn test_usernames_are_unique_case_insensitively() {
    let store = store();
    store.create_user(&fixtures::user("alice")).unwrap();

    let mut clash = fixtures::user("other");
    clash.username = "ALICE".into();
    let err = store.create_user(&clash).expect_err("username taken");
    assert!(matches!(err, StoreError::Conflict { .. }), "got {err:?}");

    assert_eq!(store.get_user_by_username("Alice").unwrap().id, "alice");
    assert_eq!(store.get_user_by_email("ALICE@example.com").unwrap().id, "alice");
}

#[test]
fn test_session_expires() {
    let store = store();
    store.create_user(&fixtures::user("u1")).unwrap();
    let short = store.create_session("u1", "hash-short", chrono::Duration::milliseconds(1)).unwrap();
    let long = store.create_session("u1", "hash-long", chrono::Duration::hours(1)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));

    let err = store.get_session(&short.id).expect_err("expired");
    assert!(matches!(err, StoreError::Expired { .. }), "got {err:?}");
    assert_eq!(store.get_session_by_token("hash-long").unwrap().id, long.id);

    assert_eq!(store.delete_expired_sessions(&never()).unwrap(), 1);
    assert_eq!(store.sessions_for_user("u1").unwrap().len(), 1);
}

#[test]
fn test_delete_user_removes_sessions() {
    let store = store();
    store.create_user(&fixtures::user("u1")).unwrap();
    store.create_session("u1", "h1", chrono::Duration::hours(1)).unwrap();
    store.delete_user("u1").unwrap();
    assert!(!store.user_exists("u1").unwrap());
    assert!(store.get_session_by_token("h1").expect_err("gone").is_not_found());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_keeps_records_and_indexes() {
    let dir = TestDir::new();
    let path = dir.join("folio.redb");
    {
        let store = Store::open(&path, test_config()).unwrap();
        store.create_book(&fixtures::book("b1", "lib", &[42])).unwrap();
    }
    let store = Store::open(&path, test_config()).unwrap();
    assert_eq!(store.get_book("b1").unwrap().path, "/lib/b1");
    assert_eq!(store.get_book_by_inode(42).unwrap().id, "b1");
}
