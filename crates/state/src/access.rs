//! Book and collection visibility.
//!
//! A book is visible to a user when, in this order:
//!
//! 1. it is not a member of its library's inbox (this denial is absolute);
//! 2. the user reaches a global-access collection of that library; or
//! 3. it is a member of a collection the user owns or was shared; or
//! 4. the library is open and the book belongs to no collection at all.
//!
//! Decisions are computed per request from an [`AccessContext`] and never
//! persisted. A library that does not exist is treated as open.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use folio_types::{AccessMode, Book, Collection, Permission};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::edges::{BOOK_COLLECTION, is_linked, targets};
use crate::engine::KvRead;
use crate::entity::{fetch_live, load_live, require};
use crate::error::{Result, ensure_active};
use crate::keys::{CollectionKeys, EntityType, index_prefix, split_components, trailing_component};
use crate::pagination::{Page, PageParams, paginate_sorted_ids};
use crate::store::Store;

/// What one user can reach inside one library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    /// Library the context applies to.
    pub library_id: String,
    /// The library's policy, [`AccessMode::Open`] if it does not exist.
    pub mode: AccessMode,
    /// User the context was computed for.
    pub user_id: String,
    /// Live non-inbox collections of this library the user owns or was
    /// shared.
    pub collection_ids: BTreeSet<String>,
    /// Whether any of those collections grants global access.
    pub has_global_access: bool,
    /// The library's inbox collection, if one exists.
    pub inbox_id: Option<String>,
}

/// Outcome of a collection access check.
///
/// A missing collection and a collection the user was never shared look the
/// same: `can_access` is false and the other fields are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionAccess {
    /// Whether the user may see the collection.
    pub can_access: bool,
    /// Granted level; owners always hold [`Permission::Write`].
    pub permission: Option<Permission>,
    /// Whether the user owns the collection.
    pub is_owner: bool,
}

impl CollectionAccess {
    const DENIED: Self = Self { can_access: false, permission: None, is_owner: false };

    fn owner() -> Self {
        Self { can_access: true, permission: Some(Permission::Write), is_owner: true }
    }

    fn shared(permission: Permission) -> Self {
        Self { can_access: true, permission: Some(permission), is_owner: false }
    }
}

/// Per-request memo of a user's collections and their contexts by library.
pub(crate) struct ContextCache {
    user_id: String,
    collections: Option<Vec<Collection>>,
    contexts: HashMap<String, AccessContext>,
}

impl ContextCache {
    pub(crate) fn new(user_id: &str) -> Self {
        Self { user_id: user_id.to_string(), collections: None, contexts: HashMap::new() }
    }

    /// Live collections the user owns or was shared, in every library.
    pub(crate) fn collections<R: KvRead>(&mut self, store: &Store, txn: &R) -> Result<&[Collection]> {
        if self.collections.is_none() {
            self.collections = Some(store.user_collections_in(txn, &self.user_id)?);
        }
        Ok(self.collections.as_deref().unwrap_or_default())
    }

    pub(crate) fn get<R: KvRead>(&mut self, store: &Store, txn: &R, library_id: &str) -> Result<&AccessContext> {
        if self.collections.is_none() {
            self.collections = Some(store.user_collections_in(txn, &self.user_id)?);
        }
        match self.contexts.entry(library_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let collections = self.collections.as_deref().unwrap_or_default();
                let ctx = store.build_context(txn, &self.user_id, library_id, collections)?;
                Ok(entry.insert(ctx))
            },
        }
    }
}

impl Store {
    /// Collections owned by or shared with `user_id`, live only, sorted by ID.
    pub(crate) fn user_collections_in<R: KvRead>(&self, txn: &R, user_id: &str) -> Result<Vec<Collection>> {
        let mut ids = BTreeSet::new();
        let prefix = CollectionKeys::owner_prefix(user_id);
        for (key, _) in txn.scan_prefix(&prefix)? {
            if let Some(id) = trailing_component(&key, &prefix) {
                ids.insert(id);
            }
        }
        for share in self.shares().find_by_in(txn, "user", user_id)? {
            ids.insert(share.collection_id);
        }
        let mut collections = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(collection) = load_live::<Collection, _>(txn, id)? {
                collections.push(collection);
            }
        }
        Ok(collections)
    }

    fn build_context<R: KvRead>(
        &self,
        txn: &R,
        user_id: &str,
        library_id: &str,
        collections: &[Collection],
    ) -> Result<AccessContext> {
        let mode = self
            .library_cache()
            .get(self.engine(), library_id)?
            .map_or(AccessMode::Open, |library| library.access_mode);
        let mut collection_ids = BTreeSet::new();
        let mut has_global_access = false;
        for collection in collections.iter().filter(|c| c.library_id == library_id && !c.is_inbox) {
            has_global_access |= collection.global_access;
            collection_ids.insert(collection.id.clone());
        }
        Ok(AccessContext {
            library_id: library_id.to_string(),
            mode,
            user_id: user_id.to_string(),
            collection_ids,
            has_global_access,
            inbox_id: self.inbox_id_in(txn, library_id)?,
        })
    }

    /// Applies the visibility rules to one book of `ctx`'s library.
    pub(crate) fn book_visible_in<R: KvRead>(&self, txn: &R, ctx: &AccessContext, book_id: &str) -> Result<bool> {
        if let Some(inbox) = &ctx.inbox_id {
            if is_linked(txn, BOOK_COLLECTION, book_id, inbox)? {
                return Ok(false);
            }
        }
        if ctx.has_global_access {
            return Ok(true);
        }
        let memberships = targets(txn, BOOK_COLLECTION, book_id)?;
        if memberships.iter().any(|c| ctx.collection_ids.contains(c)) {
            return Ok(true);
        }
        Ok(ctx.mode == AccessMode::Open && memberships.is_empty())
    }

    /// Whether `user_id` may see `book_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// book is absent or deleted.
    pub fn can_user_access_book(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let txn = self.read()?;
        let book: Book = require(&txn, book_id)?;
        let mut contexts = ContextCache::new(user_id);
        let ctx = contexts.get(self, &txn, &book.library_id)?;
        let visible = self.book_visible_in(&txn, ctx, book_id)?;
        tracing::trace!(user_id, book_id, visible, "Book access decided");
        Ok(visible)
    }

    /// Every book `user_id` may see, sorted by ID.
    ///
    /// A global-access collection reveals every non-inbox book of its own
    /// library, whatever that library's mode, and nothing in other
    /// libraries. Collections only ever hold books of their own library, so
    /// this agrees with [`can_user_access_book`](Self::can_user_access_book)
    /// book by book.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`](crate::StoreError::Cancelled) if
    /// `cancel` fires, or an engine or codec error.
    pub fn books_for_user(&self, user_id: &str, cancel: &CancellationToken) -> Result<Vec<Book>> {
        let txn = self.read()?;
        let ids = self.accessible_book_ids(&txn, user_id, cancel)?;
        fetch_live(&txn, &ids, cancel)
    }

    /// One page of [`books_for_user`](Self::books_for_user).
    ///
    /// The cursor is the last returned book ID, so pages stay consistent
    /// while books are added or removed between requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`](crate::StoreError::InvalidInput)
    /// for a malformed cursor, or any error of `books_for_user`.
    pub fn paginated_books_for_user(
        &self,
        user_id: &str,
        params: &PageParams,
        cancel: &CancellationToken,
    ) -> Result<Page<Book>> {
        let txn = self.read()?;
        let ids = self.accessible_book_ids(&txn, user_id, cancel)?;
        let page = paginate_sorted_ids(&ids, params, &self.config().pagination)?;
        let items = fetch_live(&txn, &page.items, cancel)?;
        Ok(Page { items, has_more: page.has_more, next_cursor: page.next_cursor, total: page.total })
    }

    fn accessible_book_ids<R: KvRead>(&self, txn: &R, user_id: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        ensure_active(cancel)?;
        let mut contexts = ContextCache::new(user_id);

        let uncollected_prefix = index_prefix(EntityType::Book, "uncollected", &[]);
        let mut uncollected: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, _) in txn.scan_prefix(&uncollected_prefix)? {
            ensure_active(cancel)?;
            if let Some(mut parts) = split_components(&key, &uncollected_prefix) {
                if parts.len() == 2 {
                    let book_id = parts.pop().unwrap_or_default();
                    let library_id = parts.pop().unwrap_or_default();
                    uncollected.entry(library_id).or_default().push(book_id);
                }
            }
        }

        let mut libraries: BTreeSet<String> =
            self.library_cache().all(self.engine())?.into_iter().map(|library| library.id).collect();
        libraries.extend(uncollected.keys().cloned());
        libraries.extend(contexts.collections(self, txn)?.iter().map(|c| c.library_id.clone()));

        let mut visible = BTreeSet::new();
        let mut hidden = BTreeSet::new();
        for library_id in &libraries {
            ensure_active(cancel)?;
            let ctx = contexts.get(self, txn, library_id)?;
            if ctx.has_global_access {
                let prefix = CollectionKeys::library_book_prefix(library_id);
                for (key, _) in txn.scan_prefix(&prefix)? {
                    ensure_active(cancel)?;
                    if let Some(book_id) = trailing_component(&key, &prefix) {
                        visible.insert(book_id);
                    }
                }
            } else {
                for collection_id in &ctx.collection_ids {
                    visible.extend(targets(txn, BOOK_COLLECTION.reversed(), collection_id)?);
                }
                if ctx.mode == AccessMode::Open {
                    if let Some(book_ids) = uncollected.remove(library_id) {
                        visible.extend(book_ids);
                    }
                }
            }
            if let Some(inbox) = &ctx.inbox_id {
                hidden.extend(targets(txn, BOOK_COLLECTION.reversed(), inbox)?);
            }
        }
        Ok(visible.difference(&hidden).cloned().collect())
    }

    /// Whether and how `user_id` may use `collection_id`.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error; a missing collection is a denial,
    /// not an error.
    pub fn can_user_access_collection(&self, user_id: &str, collection_id: &str) -> Result<CollectionAccess> {
        let txn = self.read()?;
        let Some(collection) = load_live::<Collection, _>(&txn, collection_id)? else {
            return Ok(CollectionAccess::DENIED);
        };
        if collection.owner_id == user_id {
            return Ok(CollectionAccess::owner());
        }
        Ok(self
            .share_for_in(&txn, collection_id, user_id)?
            .map_or(CollectionAccess::DENIED, |share| CollectionAccess::shared(share.permission)))
    }

    /// Live collections `user_id` owns or was shared, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn collections_for_user(&self, user_id: &str) -> Result<Vec<Collection>> {
        let txn = self.read()?;
        self.user_collections_in(&txn, user_id)
    }

    /// The access context of `user_id` in `library_id`.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn access_context(&self, user_id: &str, library_id: &str) -> Result<AccessContext> {
        let txn = self.read()?;
        let mut contexts = ContextCache::new(user_id);
        Ok(contexts.get(self, &txn, library_id)?.clone())
    }
}
