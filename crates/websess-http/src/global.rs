//! A process-wide default manager and delegator functions.
//!
//! The dependency-injected constructors in [`crate::manager`] are the
//! primary API; this module layers a convenience singleton on top for
//! applications that want one manager for the whole process.

use std::sync::{Arc, LazyLock, RwLock};

use http::HeaderMap;
use websess_core::Session;
use websess_store::MemoryStore;

use crate::manager::{CookieManager, ManagerError, SessionManager};

static GLOBAL: LazyLock<RwLock<Option<Arc<dyn SessionManager>>>> =
    LazyLock::new(|| RwLock::new(None));

/// The process-wide default manager.
///
/// Lazily constructed on first use as a [`CookieManager`] over a fresh
/// in-memory store. The first call must therefore happen inside a tokio
/// runtime (constructing the default store spawns its sweeper task).
pub fn global() -> Arc<dyn SessionManager> {
    if let Some(manager) = GLOBAL.read().unwrap().as_ref() {
        return Arc::clone(manager);
    }

    let mut slot = GLOBAL.write().unwrap();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(CookieManager::new(MemoryStore::new()))))
}

/// Replace the global manager, returning the previous one if it was ever
/// constructed.
///
/// The previous manager keeps its backing store running until closed: a
/// caller replacing the global should close the returned manager once it is
/// no longer needed.
pub fn set_global(manager: Arc<dyn SessionManager>) -> Option<Arc<dyn SessionManager>> {
    GLOBAL.write().unwrap().replace(manager)
}

/// Delegates to the global manager; returns the session named by the request
/// headers.
///
/// # Errors
/// Returns an error if the global manager's backing store fails.
pub async fn get(headers: &HeaderMap) -> Result<Option<Session>, ManagerError> {
    global().get(headers).await
}

/// Delegates to the global manager; adds the session to its store and
/// attaches the session id to the response headers.
///
/// # Errors
/// Returns an error if the id cannot be attached or the backing store fails.
pub async fn add(session: Session, headers: &mut HeaderMap) -> Result<(), ManagerError> {
    global().add(session, headers).await
}

/// Delegates to the global manager; removes the session from its store and
/// instructs the client to stop carrying the session id.
///
/// # Errors
/// Returns an error if the clearing instruction cannot be attached or the
/// backing store fails.
pub async fn remove(session: &Session, headers: &mut HeaderMap) -> Result<(), ManagerError> {
    global().remove(session, headers).await
}

/// Delegates to the global manager; closes it, releasing its backing store.
pub async fn close() {
    global().close().await;
}

#[cfg(test)]
mod tests {
    use http::{
        HeaderValue,
        header::{COOKIE, SET_COOKIE},
    };
    use serde_json::json;

    use super::*;
    use crate::manager::CookieManagerOptions;

    // The counter scenario: first visit creates the session, the second
    // mutates it, the third removes it, and a fourth starts over. One test
    // drives all of it; the global manager is process-wide state.
    #[tokio::test]
    async fn global_counter_flow() {
        let previous = set_global(Arc::new(CookieManager::with_options(
            MemoryStore::new(),
            CookieManagerOptions {
                allow_http: true,
                ..CookieManagerOptions::default()
            },
        )));
        assert!(previous.is_none());

        let mut cookie_jar: Option<HeaderValue> = None;
        let mut visits = Vec::new();

        for _ in 0..4 {
            let mut request = HeaderMap::new();
            if let Some(cookie) = &cookie_jar {
                request.insert(COOKIE, cookie.clone());
            }
            let mut response = HeaderMap::new();

            match get(&request).await.unwrap() {
                None => {
                    let session = Session::new().unwrap();
                    session.set_attr("counter", 1);
                    add(session, &mut response).await.unwrap();
                    visits.push(0);
                }
                Some(session) if session.attr("counter") == Some(json!(1)) => {
                    session.set_attr("counter", 2);
                    visits.push(1);
                }
                Some(session) => {
                    remove(&session, &mut response).await.unwrap();
                    visits.push(2);
                }
            }

            // Apply the response's Set-Cookie the way a client would.
            if let Some(set_cookie) = response.get(SET_COOKIE) {
                let raw = set_cookie.to_str().unwrap();
                if raw.contains("Max-Age=0") {
                    cookie_jar = None;
                } else {
                    let pair = raw.split(';').next().unwrap();
                    cookie_jar = Some(HeaderValue::from_str(pair).unwrap());
                }
            }
        }

        assert_eq!(visits, [0, 1, 2, 0]);
        close().await;
    }
}
