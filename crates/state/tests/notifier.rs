//! Post-commit side effects observed through the notifier port.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::never;
use folio_state::Store;
use folio_state::notify::{
    BookView, ChannelEventEmitter, Notifier, NotifyResult, SearchIndexer, StoreEnricher, StoreEvent,
    TranscodeDeleter,
};
use folio_test_utils::{assert_eventually, fixtures, test_config};
use folio_types::{AccessMode, Contributor, Permission, Series, Tag};
use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn has(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    fn push(&self, call: String) -> NotifyResult {
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl SearchIndexer for Recorder {
    async fn index_book(&self, book: &BookView) -> NotifyResult {
        self.push(format!("index_book:{}", book.book.id))
    }
    async fn delete_book(&self, id: &str) -> NotifyResult {
        self.push(format!("delete_book:{id}"))
    }
    async fn index_contributor(&self, contributor: &Contributor) -> NotifyResult {
        self.push(format!("index_contributor:{}", contributor.id))
    }
    async fn delete_contributor(&self, id: &str) -> NotifyResult {
        self.push(format!("delete_contributor:{id}"))
    }
    async fn index_series(&self, series: &Series) -> NotifyResult {
        self.push(format!("index_series:{}", series.id))
    }
    async fn delete_series(&self, id: &str) -> NotifyResult {
        self.push(format!("delete_series:{id}"))
    }
}

#[async_trait]
impl TranscodeDeleter for Recorder {
    async fn delete_transcodes_for_book(&self, book_id: &str) -> NotifyResult {
        self.push(format!("transcodes:{book_id}"))
    }
}

struct Harness {
    store: Store,
    recorder: Arc<Recorder>,
    events: broadcast::Receiver<StoreEvent>,
}

fn harness() -> Harness {
    let config = test_config();
    let store = Store::in_memory(config.clone()).unwrap();
    let recorder = Arc::new(Recorder::default());
    let emitter = ChannelEventEmitter::new(64);
    let events = emitter.subscribe();
    let notifier = Notifier::noop(&config.notifier)
        .with_search(Arc::clone(&recorder) as Arc<dyn SearchIndexer>)
        .with_transcodes(Arc::clone(&recorder) as Arc<dyn TranscodeDeleter>)
        .with_events(Arc::new(emitter))
        .with_enricher(Arc::new(StoreEnricher::new(store.engine().clone())));
    Harness { store: store.with_notifier(notifier), recorder, events }
}

/// Collects `n` events; dispatch tasks may finish in any order.
async fn collect(events: &mut broadcast::Receiver<StoreEvent>, n: usize) -> Vec<StoreEvent> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Ok(event)) => out.push(event),
            Ok(Err(e)) => panic!("event channel failed: {e}"),
            Err(_) => panic!("timed out after {} of {n} events: {out:?}", out.len()),
        }
    }
    out
}

#[tokio::test]
async fn test_book_lifecycle_reaches_collaborators() {
    let mut h = harness();
    h.store.create_contributor(&Contributor::new("c1", "Ursula", fixtures::fixed_time())).unwrap();
    let mut book = fixtures::authored_book("b1", "lib", "c1");
    book.contributors[0].credited_as = Some("U. K. Le Guin".into());
    h.store.create_book(&book).unwrap();

    let events = collect(&mut h.events, 2).await;
    let created = events
        .iter()
        .find_map(|e| match e {
            StoreEvent::BookCreated(view) => Some(view.clone()),
            _ => None,
        })
        .expect("book created event");
    assert!(created.enriched);
    assert_eq!(created.contributors[0].name, "U. K. Le Guin");

    h.store.delete_book("b1").unwrap();
    let recorder = Arc::clone(&h.recorder);
    assert!(
        assert_eventually(Duration::from_secs(2), || {
            recorder.has("index_book:b1") && recorder.has("delete_book:b1") && recorder.has("transcodes:b1")
        })
        .await
    );
    // The book was the contributor's last credit.
    assert!(assert_eventually(Duration::from_secs(2), || recorder.has("delete_contributor:c1")).await);
}

#[tokio::test]
async fn test_merge_publishes_merge_and_book_events() {
    let mut h = harness();
    h.store.create_contributor(&Contributor::new("a", "Richard Bachman", fixtures::fixed_time())).unwrap();
    h.store.create_contributor(&Contributor::new("b", "Stephen King", fixtures::fixed_time())).unwrap();
    h.store.create_book(&fixtures::authored_book("b1", "lib", "a")).unwrap();
    collect(&mut h.events, 3).await;

    h.store.merge_contributors("a", "b").unwrap();
    let events = collect(&mut h.events, 4).await;
    assert!(events.contains(&StoreEvent::ContributorsMerged { source: "a".into(), target: "b".into() }));
    assert!(events.contains(&StoreEvent::ContributorDeleted { id: "a".into() }));
    assert!(events.iter().any(|e| matches!(e, StoreEvent::ContributorUpdated(c) if c.id == "b")));
    let updated = events
        .iter()
        .find_map(|e| match e {
            StoreEvent::BookUpdated(view) => Some(view.clone()),
            _ => None,
        })
        .expect("book updated event");
    assert_eq!(updated.contributors[0].contributor_id, "b");
    assert_eq!(updated.contributors[0].name, "Richard Bachman");
}

#[tokio::test]
async fn test_touch_is_silent() {
    let mut h = harness();
    h.store.create_book(&fixtures::book("b1", "lib", &[])).unwrap();
    collect(&mut h.events, 1).await;

    h.store.touch_book("b1").unwrap();
    h.store.create_collection(&fixtures::collection("c1", "lib", "u1", &[])).unwrap();
    let events = collect(&mut h.events, 1).await;
    assert!(matches!(&events[0], StoreEvent::CollectionUpdated(c) if c.id == "c1"), "got {events:?}");
}

#[tokio::test]
async fn test_access_changes_are_published() {
    let mut h = harness();
    let mut library = h.store.create_library(&fixtures::library("lib", "admin")).unwrap();
    let events = collect(&mut h.events, 1).await;
    assert!(matches!(&events[0], StoreEvent::LibraryUpdated(l) if l.id == "lib"), "got {events:?}");

    library.access_mode = AccessMode::Restricted;
    h.store.update_library(&library).unwrap();
    let events = collect(&mut h.events, 1).await;
    assert!(
        matches!(&events[0], StoreEvent::LibraryUpdated(l) if l.access_mode == AccessMode::Restricted),
        "got {events:?}"
    );

    h.store.create_collection(&fixtures::collection("c1", "lib", "u1", &[])).unwrap();
    collect(&mut h.events, 1).await;
    h.store.share_collection("c1", "u2", "u1", Permission::Read).unwrap();
    let events = collect(&mut h.events, 1).await;
    assert!(
        matches!(&events[0], StoreEvent::CollectionShared(s) if s.user_id == "u2" && s.permission == Permission::Read),
        "got {events:?}"
    );

    // Re-sharing at the same level changes nothing and stays silent.
    h.store.share_collection("c1", "u2", "u1", Permission::Read).unwrap();
    h.store.unshare_collection("c1", "u2").unwrap();
    h.store.unshare_collection("c1", "u2").unwrap();
    h.store.delete_library("lib").unwrap();
    let events = collect(&mut h.events, 2).await;
    assert!(events.contains(&StoreEvent::CollectionUnshared { collection_id: "c1".into(), user_id: "u2".into() }));
    assert!(events.contains(&StoreEvent::LibraryDeleted { id: "lib".into() }));
}

#[tokio::test]
async fn test_tag_user_and_session_changes_are_published() {
    let mut h = harness();
    h.store.create_book(&fixtures::book("b1", "lib", &[])).unwrap();
    collect(&mut h.events, 1).await;

    let tag = Tag { id: "t1".into(), slug: "classic".into(), name: "Classic".into(), created_at: fixtures::fixed_time() };
    h.store.create_tag(&tag).unwrap();
    h.store.add_tag_to_book("b1", "t1").unwrap();
    h.store.add_tag_to_book("b1", "t1").unwrap();
    let events = collect(&mut h.events, 2).await;
    assert!(events.contains(&StoreEvent::TagCreated(tag.clone())));
    assert!(events.contains(&StoreEvent::BookTagged { book_id: "b1".into(), tag_id: "t1".into() }));

    h.store.remove_tag_from_book("b1", "t1").unwrap();
    h.store.remove_tag_from_book("b1", "t1").unwrap();
    h.store.delete_tag("t1").unwrap();
    let events = collect(&mut h.events, 2).await;
    assert!(events.contains(&StoreEvent::BookUntagged { book_id: "b1".into(), tag_id: "t1".into() }));
    assert!(events.contains(&StoreEvent::TagDeleted { id: "t1".into() }));

    h.store.create_user(&fixtures::user("u1")).unwrap();
    let session = h.store.create_session("u1", "hash", chrono::Duration::hours(1)).unwrap();
    let events = collect(&mut h.events, 2).await;
    assert!(events.contains(&StoreEvent::UserUpdated { id: "u1".into() }));
    assert!(events.contains(&StoreEvent::SessionCreated { id: session.id.clone(), user_id: "u1".into() }));

    h.store.delete_session(&session.id).unwrap();
    h.store.delete_user("u1").unwrap();
    let events = collect(&mut h.events, 2).await;
    assert!(events.contains(&StoreEvent::SessionDeleted { id: session.id, user_id: "u1".into() }));
    assert!(events.contains(&StoreEvent::UserDeleted { id: "u1".into() }));
}

#[test]
fn test_writes_succeed_without_runtime() {
    let h = harness();
    h.store.create_book(&fixtures::book("b1", "lib", &[])).unwrap();
    assert_eq!(h.store.books_updated_after(fixtures::fixed_time(), &never()).unwrap().len(), 1);
}
