//! Cookie based session manager.

use std::time::Duration;

use async_trait::async_trait;
use cookie::Cookie;
use http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use websess_core::{Session, SessionStore, StoreError};

/// Default name of the session id cookie.
pub const DEFAULT_COOKIE_NAME: &str = "sessid";

/// Default max age of the session id cookie (30 days).
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The configured cookie settings produce an invalid header value.
    #[error("invalid session cookie: {0}")]
    InvalidCookie(#[from] http::header::InvalidHeaderValue),
}

/// Trait for session managers.
///
/// A manager acquires the session named by an incoming request's headers and
/// lets the client know about a session by attaching its id to outgoing
/// response headers. A manager has a backing [`SessionStore`] which owns the
/// session values at the server side.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// The session named by the request headers.
    ///
    /// `Ok(None)` if the headers carry no session id, or the id is unknown to
    /// (or already expired from) the backing store.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    async fn get(&self, headers: &HeaderMap) -> Result<Option<Session>, ManagerError>;

    /// Add the session to the backing store and attach its id to the
    /// response headers so the client carries it on subsequent requests.
    ///
    /// # Errors
    /// Returns an error if the id cannot be attached or the backing store
    /// fails.
    async fn add(&self, session: Session, headers: &mut HeaderMap) -> Result<(), ManagerError>;

    /// Remove the session from the backing store and instruct the client to
    /// stop carrying its id.
    ///
    /// # Errors
    /// Returns an error if the clearing instruction cannot be attached or the
    /// backing store fails.
    async fn remove(&self, session: &Session, headers: &mut HeaderMap) -> Result<(), ManagerError>;

    /// Close the manager, releasing the backing store.
    async fn close(&self);
}

/// Options for creating a [`CookieManager`].
///
/// All fields have defaults; `CookieManagerOptions::default()` is equivalent
/// to [`CookieManager::new`].
#[derive(Debug, Clone)]
pub struct CookieManagerOptions {
    /// Name of the cookie carrying the session id.
    pub cookie_name: String,

    /// Allow the session id cookie to be sent over unencrypted HTTP too.
    /// When `false` the cookie is marked `Secure` and travels over HTTPS
    /// only.
    pub allow_http: bool,

    /// Max age of the session id cookie.
    pub max_age: Duration,

    /// Cookie path.
    pub path: String,
}

impl Default for CookieManagerOptions {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            allow_http: false,
            max_age: DEFAULT_COOKIE_MAX_AGE,
            path: "/".to_owned(),
        }
    }
}

/// A secure, cookie based session manager.
///
/// Only the session id is transmitted to and stored at the client. The
/// cookie is always marked `HttpOnly` so page scripts can never read it, and
/// unless [`CookieManagerOptions::allow_http`] is set it is also marked
/// `Secure` so it only travels over encrypted connections.
pub struct CookieManager<S> {
    store: S,

    cookie_name: String,
    secure: bool,
    max_age: Duration,
    path: String,
}

impl<S: SessionStore> CookieManager<S> {
    /// Create a new cookie based session manager over `store` with the
    /// default options.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_options(store, CookieManagerOptions::default())
    }

    /// Create a new cookie based session manager over `store` with the
    /// specified options.
    #[must_use]
    pub fn with_options(store: S, options: CookieManagerOptions) -> Self {
        Self {
            store,
            cookie_name: options.cookie_name,
            secure: !options.allow_http,
            max_age: options.max_age,
            path: options.path,
        }
    }

    /// Name of the cookie carrying the session id.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Whether the session id cookie is restricted to encrypted transport.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Max age of the session id cookie.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Cookie path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Session id carried by the request headers, if any.
    fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.cookie_name)
            .map(|cookie| cookie.value().to_owned())
    }

    /// Append a `Set-Cookie` header carrying `value` under the configured
    /// name, path and transport flags.
    fn set_cookie(
        &self,
        value: &str,
        max_age: cookie::time::Duration,
        headers: &mut HeaderMap,
    ) -> Result<(), ManagerError> {
        let cookie = Cookie::build((self.cookie_name.as_str(), value))
            .path(self.path.as_str())
            .http_only(true)
            .secure(self.secure)
            .max_age(max_age)
            .build();

        headers.append(SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
        Ok(())
    }
}

#[async_trait]
impl<S: SessionStore> SessionManager for CookieManager<S> {
    async fn get(&self, headers: &HeaderMap) -> Result<Option<Session>, ManagerError> {
        let Some(id) = self.session_id(headers) else {
            return Ok(None);
        };

        Ok(self.store.get(&id).await?)
    }

    async fn add(&self, session: Session, headers: &mut HeaderMap) -> Result<(), ManagerError> {
        let max_age =
            cookie::time::Duration::try_from(self.max_age).unwrap_or(cookie::time::Duration::MAX);
        self.set_cookie(session.id(), max_age, headers)?;

        self.store.add(session).await?;
        Ok(())
    }

    async fn remove(&self, session: &Session, headers: &mut HeaderMap) -> Result<(), ManagerError> {
        // Empty value and zero max age tell the client to drop the cookie.
        self.set_cookie("", cookie::time::Duration::ZERO, headers)?;

        self.store.remove(session).await?;
        Ok(())
    }

    async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use websess_store::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn options_are_applied() {
        let options = CookieManagerOptions {
            cookie_name: "test".to_owned(),
            allow_http: true,
            max_age: Duration::from_secs(1234),
            path: "/testpath".to_owned(),
        };
        let manager = CookieManager::with_options(MemoryStore::new(), options.clone());

        assert_eq!(manager.cookie_name(), "test");
        assert_eq!(manager.secure(), !options.allow_http);
        assert_eq!(manager.max_age(), options.max_age);
        assert_eq!(manager.path(), "/testpath");

        manager.close().await;
    }

    #[tokio::test]
    async fn cookie_round_trip() {
        let manager = CookieManager::new(MemoryStore::new());

        // No cookie on the request: no session.
        assert!(manager.get(&HeaderMap::new()).await.unwrap().is_none());

        let session = Session::new().unwrap();
        let mut response = HeaderMap::new();
        manager.add(session.clone(), &mut response).await.unwrap();

        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains(&format!("sessid={}", session.id())));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("Path=/"));

        // A request carrying the issued cookie finds the session.
        let mut request = HeaderMap::new();
        request.insert(
            COOKIE,
            HeaderValue::from_str(&format!("other=1; sessid={}", session.id())).unwrap(),
        );
        let found = manager.get(&request).await.unwrap().expect("session");
        assert_eq!(found.id(), session.id());

        // A request carrying an unknown id finds nothing.
        let mut stranger = HeaderMap::new();
        stranger.insert(COOKIE, HeaderValue::from_static("sessid=unknown"));
        assert!(manager.get(&stranger).await.unwrap().is_none());

        // Removal clears the cookie and the store entry.
        let mut response = HeaderMap::new();
        manager.remove(&session, &mut response).await.unwrap();
        let cleared = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.starts_with("sessid="));
        assert!(cleared.contains("Max-Age=0"));
        assert!(manager.get(&request).await.unwrap().is_none());

        manager.close().await;
    }
}
