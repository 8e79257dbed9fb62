//! Store trait shared by session store backends.

use async_trait::async_trait;
use thiserror::Error;

use crate::Session;

/// Store error.
///
/// A missing session is not an error; lookups report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (poisoned lock, remote store I/O, ...).
    #[error("store error: {0}")]
    Internal(String),
}

/// Trait for session store backends.
///
/// A store owns sessions at the server side and makes them retrievable by
/// their ids. The in-memory implementation lives in `websess-store`; backing
/// stores with other lifetimes (e.g. a remote cache) can be provided as
/// sibling implementations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get the session with the specified id.
    ///
    /// On a hit the session's last accessed time is refreshed to the current
    /// time before it is returned; callers never refresh it themselves.
    /// `Ok(None)` means the store holds no session under this id.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Add a session to the store, keyed by its id.
    ///
    /// An existing session under the same id is silently replaced: ids carry
    /// enough entropy that a collision is caller misuse, not a runtime case.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    async fn add(&self, session: Session) -> Result<(), StoreError>;

    /// Remove a session from the store.
    ///
    /// Removing a session the store does not hold is a no-op.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    async fn remove(&self, session: &Session) -> Result<(), StoreError>;

    /// Close the store, releasing any resources that were allocated.
    ///
    /// Using the store after `close` is undefined.
    async fn close(&self);
}
