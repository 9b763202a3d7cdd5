//! Collection shares.

use folio_types::{Collection, CollectionShare, Permission, new_id};

use super::Store;
use crate::engine::KvRead;
use crate::entity::require;
use crate::error::{Result, StoreError};
use crate::index::{IndexDef, IndexSet};
use crate::keys::EntityType;
use crate::notify::StoreEvent;

fn member_key(collection_id: &str, user_id: &str) -> String {
    format!("{collection_id}:{user_id}")
}

/// Index declarations for shares: by collection, by recipient and the unique
/// (collection, recipient) pair.
pub(super) fn indexes() -> IndexSet<CollectionShare> {
    IndexSet::new(EntityType::Share)
        .with(IndexDef::single("collection", |s: &CollectionShare| Some(s.collection_id.clone())))
        .with(IndexDef::single("user", |s: &CollectionShare| Some(s.user_id.clone())))
        .with(IndexDef::single("member", |s: &CollectionShare| Some(member_key(&s.collection_id, &s.user_id))).unique())
}

impl Store {
    pub(crate) fn share_for_in<R: KvRead>(
        &self,
        txn: &R,
        collection_id: &str,
        user_id: &str,
    ) -> Result<Option<CollectionShare>> {
        Ok(self.shares().find_by_in(txn, "member", &member_key(collection_id, user_id))?.into_iter().next())
    }

    /// Shares a live collection with a user, or changes the permission of an
    /// existing share.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the collection is absent or
    /// [`StoreError::InvalidInput`] when sharing with the owner.
    pub fn share_collection(
        &self,
        collection_id: &str,
        user_id: &str,
        shared_by: &str,
        permission: Permission,
    ) -> Result<CollectionShare> {
        let (share, changed) = self.write("share.create", |txn| {
            let collection: Collection = require(&*txn, collection_id)?;
            if collection.owner_id == user_id {
                return Err(StoreError::invalid("a collection cannot be shared with its owner"));
            }
            let share = match self.share_for_in(&*txn, collection_id, user_id)? {
                Some(existing) if existing.permission == permission => return Ok((existing, false)),
                Some(existing) => {
                    self.shares().delete_in(txn, &existing.id)?;
                    CollectionShare { permission, shared_by: shared_by.to_string(), ..existing }
                },
                None => CollectionShare {
                    id: new_id(),
                    collection_id: collection_id.to_string(),
                    user_id: user_id.to_string(),
                    shared_by: shared_by.to_string(),
                    permission,
                    created_at: self.now(),
                },
            };
            self.shares().create_in(txn, &share)?;
            Ok((share, true))
        })?;
        if changed {
            self.notifier().publish(StoreEvent::CollectionShared(share.clone()));
        }
        Ok(share)
    }

    /// Revokes a user's share of a collection. Missing shares are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn unshare_collection(&self, collection_id: &str, user_id: &str) -> Result<()> {
        let revoked = self.write("share.delete", |txn| {
            let Some(share) = self.share_for_in(&*txn, collection_id, user_id)? else {
                return Ok(false);
            };
            self.shares().delete_in(txn, &share.id)?;
            Ok(true)
        })?;
        if revoked {
            self.notifier().publish(StoreEvent::CollectionUnshared {
                collection_id: collection_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Returns a share by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the share is absent.
    pub fn get_share(&self, id: &str) -> Result<CollectionShare> {
        self.shares().get(id)
    }

    /// Shares of one collection, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn shares_for_collection(&self, collection_id: &str) -> Result<Vec<CollectionShare>> {
        self.shares().find_by("collection", collection_id)
    }

    /// Shares granted to one user, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn shares_for_user(&self, user_id: &str) -> Result<Vec<CollectionShare>> {
        self.shares().find_by("user", user_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use folio_types::config::FolioConfig;

    use super::*;

    fn store_with_collection() -> Store {
        let store = Store::in_memory(FolioConfig::default()).expect("store");
        store.create_collection(&Collection::new("c1", "lib", "owner", "Shelf", store.now())).unwrap();
        store
    }

    #[test]
    fn test_share_upserts_permission() {
        let store = store_with_collection();
        let first = store.share_collection("c1", "u2", "owner", Permission::Read).unwrap();
        let second = store.share_collection("c1", "u2", "owner", Permission::Write).unwrap();
        assert_eq!(first.id, second.id);
        let shares = store.shares_for_collection("c1").unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].permission, Permission::Write);
        assert_eq!(store.get_share(&first.id).unwrap().permission, Permission::Write);
    }

    #[test]
    fn test_share_rejects_owner_and_missing_collection() {
        let store = store_with_collection();
        let err = store.share_collection("c1", "owner", "owner", Permission::Read).expect_err("owner");
        assert!(matches!(err, StoreError::InvalidInput { .. }));
        let err = store.share_collection("nope", "u2", "owner", Permission::Read).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unshare_is_idempotent() {
        let store = store_with_collection();
        store.share_collection("c1", "u2", "owner", Permission::Read).unwrap();
        store.unshare_collection("c1", "u2").unwrap();
        store.unshare_collection("c1", "u2").unwrap();
        assert!(store.shares_for_user("u2").unwrap().is_empty());
    }
}
