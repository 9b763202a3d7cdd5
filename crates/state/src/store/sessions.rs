//! Refresh-token sessions.
//!
//! Only the hash of a refresh token is stored. Reading an expired session
//! fails with [`StoreError::Expired`]; expired sessions are removed by
//! [`Store::delete_expired_sessions`].

use chrono::Duration;
use folio_types::{Session, new_id};
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::error::{ExpiredSnafu, Result, StoreError, ensure_active};
use crate::index::{IndexDef, IndexSet};
use crate::keys::EntityType;
use crate::notify::StoreEvent;

pub(super) fn indexes() -> IndexSet<Session> {
    IndexSet::new(EntityType::Session)
        .with(IndexDef::single("user", |s: &Session| Some(s.user_id.clone())))
        .with(IndexDef::single("token", |s: &Session| Some(s.refresh_token_hash.clone())).unique())
}

impl Store {
    fn sessions_deleted(&self, sessions: &[Session]) {
        for session in sessions {
            self.notifier().publish(StoreEvent::SessionDeleted {
                id: session.id.clone(),
                user_id: session.user_id.clone(),
            });
        }
    }

    fn check_live(&self, session: Session) -> Result<Session> {
        if session.is_expired(self.now()) {
            return ExpiredSnafu { id: session.id }.fail();
        }
        Ok(session)
    }

    /// Opens a session for `user_id` lasting `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a non-positive `ttl` or
    /// [`StoreError::Conflict`] if the token hash is already in use.
    pub fn create_session(&self, user_id: &str, refresh_token_hash: &str, ttl: Duration) -> Result<Session> {
        if ttl <= Duration::zero() {
            return Err(StoreError::invalid("session lifetime must be positive"));
        }
        let now = self.now();
        let session = Session {
            id: new_id(),
            user_id: user_id.to_string(),
            refresh_token_hash: refresh_token_hash.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.sessions.create(&session)?;
        self.notifier()
            .publish(StoreEvent::SessionCreated { id: session.id.clone(), user_id: session.user_id.clone() });
        Ok(session)
    }

    /// Returns an unexpired session by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent or [`StoreError::Expired`]
    /// once its lifetime has elapsed.
    pub fn get_session(&self, id: &str) -> Result<Session> {
        self.check_live(self.sessions.get(id)?)
    }

    /// Returns an unexpired session by refresh token hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent or [`StoreError::Expired`]
    /// once its lifetime has elapsed.
    pub fn get_session_by_token(&self, refresh_token_hash: &str) -> Result<Session> {
        self.check_live(self.sessions.find_one_by("token", refresh_token_hash)?)
    }

    /// Deletes a session. Absent sessions are ignored.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_session(&self, id: &str) -> Result<()> {
        let removed = self.write("session.delete", |txn| self.sessions.delete_in(txn, id))?;
        self.sessions_deleted(removed.as_slice());
        Ok(())
    }

    /// Every session of a user, expired ones included, sorted by ID.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        self.sessions.find_by("user", user_id)
    }

    /// Deletes every session of a user. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an engine or codec error.
    pub fn delete_user_sessions(&self, user_id: &str) -> Result<usize> {
        let sessions = self.write("session.delete_for_user", |txn| {
            let sessions = self.sessions.find_by_in(&*txn, "user", user_id)?;
            for session in &sessions {
                self.sessions.delete_in(txn, &session.id)?;
            }
            Ok(sessions)
        })?;
        self.sessions_deleted(&sessions);
        Ok(sessions.len())
    }

    /// Deletes every session expired at the current time. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] if `cancel` fires; sessions removed
    /// before that stay removed.
    pub fn delete_expired_sessions(&self, cancel: &CancellationToken) -> Result<usize> {
        let now = self.now();
        let mut expired = Vec::new();
        for session in self.sessions.list(cancel) {
            let session = session?;
            if session.is_expired(now) {
                expired.push(session);
            }
        }
        let mut removed = 0;
        for chunk in expired.chunks(self.config().batch.batch_size.max(1)) {
            ensure_active(cancel)?;
            self.write("session.delete_expired", |txn| {
                for session in chunk {
                    self.sessions.delete_in(txn, &session.id)?;
                }
                Ok(())
            })?;
            self.sessions_deleted(chunk);
            removed += chunk.len();
        }
        if removed > 0 {
            tracing::info!(removed, "Deleted expired sessions");
        }
        Ok(removed)
    }
}
