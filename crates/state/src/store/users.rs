//! User accounts.
//!
//! Usernames and emails are unique ignoring case. Deleting a user also
//! removes their sessions and the shares granted to them.

use folio_types::User;
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::entity::{EntityIter, require};
use crate::error::Result;
use crate::index::{IndexDef, IndexSet};
use crate::keys::EntityType;
use crate::notify::StoreEvent;

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

pub(super) fn indexes() -> IndexSet<User> {
    IndexSet::new(EntityType::User)
        .with(IndexDef::single("username", |u: &User| Some(fold(&u.username))).unique().normalize_lookup(fold))
        .with(IndexDef::single("email", |u: &User| Some(fold(&u.email))).unique().normalize_lookup(fold))
}

impl Store {
    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the ID is taken, or [`StoreError::Conflict`](crate::StoreError::Conflict)
    /// if the username or email is.
    pub fn create_user(&self, user: &User) -> Result<User> {
        let mut stored = user.clone();
        stored.updated_at = self.now();
        self.users.create(&stored)?;
        self.notifier().publish(StoreEvent::UserUpdated { id: stored.id.clone() });
        Ok(stored)
    }

    /// Returns a user by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if absent.
    pub fn get_user(&self, id: &str) -> Result<User> {
        self.users.get(id)
    }

    /// Returns a user by username, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if absent.
    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.users.find_one_by("username", username)
    }

    /// Returns a user by email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if absent.
    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.users.find_one_by("email", email)
    }

    /// Replaces a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if absent
    /// or [`StoreError::Conflict`](crate::StoreError::Conflict) if the new
    /// username or email is taken.
    pub fn update_user(&self, user: &User) -> Result<User> {
        let mut stored = user.clone();
        stored.updated_at = self.now();
        self.users.update(&stored)?;
        self.notifier().publish(StoreEvent::UserUpdated { id: stored.id.clone() });
        Ok(stored)
    }

    /// Deletes a user with their sessions and received shares. Absent users
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_user(&self, id: &str) -> Result<()> {
        let deleted = self.write("user.delete", |txn| {
            for session in self.sessions.find_by_in(&*txn, "user", id)? {
                self.sessions.delete_in(txn, &session.id)?;
            }
            for share in self.shares().find_by_in(&*txn, "user", id)? {
                self.shares().delete_in(txn, &share.id)?;
            }
            Ok(self.users.delete_in(txn, id)?.is_some())
        })?;
        if deleted {
            self.notifier().publish(StoreEvent::UserDeleted { id: id.to_string() });
        }
        Ok(())
    }

    /// Lazily lists every user in ID order.
    pub fn list_users(&self, cancel: &CancellationToken) -> EntityIter<User> {
        self.users.list(cancel)
    }

    /// Whether a user exists.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn user_exists(&self, id: &str) -> Result<bool> {
        match require::<User, _>(&self.read()?, id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
