//! Session entity and identifier generation.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use rand::{RngCore, rngs::OsRng};
use serde_json::Value;

/// Default session timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default byte length of the random data behind a session id.
/// Base64 encoding turns the default 18 bytes into a 24 character id.
pub const DEFAULT_ID_BYTE_LENGTH: usize = 18;

/// Session construction error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The OS random source failed, so no session id can be issued.
    /// There is no fallback to a weaker id.
    #[error("failed to read the system random source: {0}")]
    RandomSource(#[from] rand::Error),
}

/// Options for creating a new [`Session`].
///
/// All fields have defaults; `SessionOptions::default()` is equivalent to
/// [`Session::new`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Constant attributes of the session, readable via [`Session::cattr`]
    /// but never changed after construction. Example: the authenticated user.
    pub cattrs: HashMap<String, Value>,

    /// Initial variable attributes, readable via [`Session::attr`] and
    /// changeable via [`Session::set_attr`].
    pub attrs: HashMap<String, Value>,

    /// Idle timeout; the session becomes eligible for automatic removal once
    /// it has not been accessed for this long.
    pub timeout: Duration,

    /// Byte length of the random data behind the session id. Base64 encoding
    /// makes the id string 4/3 of this in characters.
    pub id_byte_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cattrs: HashMap::new(),
            attrs: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            id_byte_length: DEFAULT_ID_BYTE_LENGTH,
        }
    }
}

/// Server-side session state identified by an opaque token.
///
/// `Session` is a cheap handle: clones share the same underlying state, so a
/// value handed to a store and the value returned by a later lookup observe
/// the same attributes and access time. All operations are safe for
/// concurrent use; variable attributes and the access time are guarded by a
/// per-session reader/writer lock.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    created: Instant,
    cattrs: HashMap<String, Value>,
    timeout: Duration,
    state: RwLock<State>,
}

struct State {
    accessed: Instant,
    attrs: HashMap<String, Value>,
}

impl Session {
    /// Create a new session with the default options.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails while generating the
    /// session id.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_options(&SessionOptions::default())
    }

    /// Create a new session with the specified options.
    ///
    /// Attribute maps are copied in: the caller's maps remain independently
    /// mutable afterwards without affecting the session.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails while generating the
    /// session id.
    pub fn with_options(options: &SessionOptions) -> Result<Self, SessionError> {
        let now = Instant::now();
        Ok(Self {
            inner: Arc::new(Inner {
                id: generate_id(options.id_byte_length)?,
                created: now,
                cattrs: options.cattrs.clone(),
                timeout: options.timeout,
                state: RwLock::new(State {
                    accessed: now,
                    attrs: options.attrs.clone(),
                }),
            }),
        })
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether the session is new: created but never accessed since.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.state.read().unwrap().accessed == self.inner.created
    }

    /// Value of a constant attribute provided at session creation.
    ///
    /// Constant attributes cannot change during the lifetime of the session,
    /// so they are readable without synchronization.
    #[must_use]
    pub fn cattr(&self, name: &str) -> Option<&Value> {
        self.inner.cattrs.get(name)
    }

    /// Value of a variable attribute stored in the session.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.inner.state.read().unwrap().attrs.get(name).cloned()
    }

    /// Set the value of a variable attribute.
    ///
    /// Passing [`Value::Null`] deletes the attribute.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();

        let mut state = self.inner.state.write().unwrap();
        if value.is_null() {
            state.attrs.remove(&name);
        } else {
            state.attrs.insert(name, value);
        }
    }

    /// A copy of all variable attributes stored in the session.
    ///
    /// Mutating the returned map does not affect the session.
    #[must_use]
    pub fn attrs(&self) -> HashMap<String, Value> {
        self.inner.state.read().unwrap().attrs.clone()
    }

    /// Session creation time.
    #[must_use]
    pub fn created(&self) -> Instant {
        self.inner.created
    }

    /// Time the session was last accessed.
    #[must_use]
    pub fn accessed(&self) -> Instant {
        self.inner.state.read().unwrap().accessed
    }

    /// Idle timeout after which the session may be removed automatically.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Register an access: set the last accessed time to the current time.
    ///
    /// The session store calls this on lookup; users do not need to call it
    /// themselves.
    pub fn access(&self) {
        self.inner.state.write().unwrap().accessed = Instant::now();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

/// Generate a secure random session id: `byte_length` bytes drawn from the
/// OS random source, URL-safe base64 encoded.
fn generate_id(byte_length: usize) -> Result<String, SessionError> {
    let mut raw = vec![0u8; byte_length];
    OsRng.try_fill_bytes(&mut raw)?;
    Ok(URL_SAFE.encode(&raw))
}
