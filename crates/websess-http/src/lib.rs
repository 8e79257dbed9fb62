//! Cookie based HTTP session management.
//!
//! Three players cooperate:
//! - `Session` (from `websess-core`) holds per-client state at the server
//!   side, identified by an opaque token.
//! - A `SessionStore` owns live sessions and evicts idle ones
//!   (`websess-store` provides the in-memory implementation).
//! - A [`SessionManager`] binds a store to the HTTP request/response cycle:
//!   it acquires the session named by an incoming request's headers and
//!   attaches (or clears) the session id on outgoing response headers.
//!
//! [`CookieManager`] is the provided manager implementation: only the session
//! id travels to the client, in a cookie marked `HttpOnly` and, by default,
//! `Secure`. The [`global`] module layers an optional process-wide default
//! manager on top of the dependency-injected constructors.

pub mod global;
pub mod manager;

pub use manager::{CookieManager, CookieManagerOptions, ManagerError, SessionManager};
