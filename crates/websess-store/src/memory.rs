//! In-memory session store with automatic expiration.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use websess_core::{Session, SessionStore, StoreError};

/// Default check interval of the expiration sweeper.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Options for creating a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    /// How often the sweeper checks for timed out sessions.
    pub sweep_interval: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

/// In-memory store implementation.
///
/// Sessions live in a single map guarded by a reader/writer lock. A
/// background sweeper evicts sessions that have been idle longer than their
/// timeout. Data is lost on restart and is not shared across processes.
///
/// Must be created inside a tokio runtime: construction spawns the sweeper
/// task. [`close`](SessionStore::close) stops the sweeper and waits for it to
/// terminate; dropping the store without closing stops it as well.
pub struct MemoryStore {
    sessions: SessionMap,
    sweeper: Mutex<Option<Sweeper>>,
}

struct Sweeper {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MemoryStore {
    /// Create a new in-memory store with the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(&MemoryStoreOptions::default())
    }

    /// Create a new in-memory store with the specified options.
    #[must_use]
    pub fn with_options(options: &MemoryStoreOptions) -> Self {
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(sweep_loop(
            Arc::clone(&sessions),
            options.sweep_interval,
            shutdown_rx,
        ));

        Self {
            sessions,
            sweeper: Mutex::new(Some(Sweeper { shutdown_tx, task })),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(sessions.get(id).map(|session| {
            session.access();
            session.clone()
        }))
    }

    async fn add(&self, session: Session) -> Result<(), StoreError> {
        tracing::debug!(id = session.id(), "session added");
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(session.id().to_owned(), session);
        Ok(())
    }

    async fn remove(&self, session: &Session) -> Result<(), StoreError> {
        tracing::debug!(id = session.id(), "session removed");
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(session.id());
        Ok(())
    }

    async fn close(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown_tx.send(());
            let _ = sweeper.task.await;
        }
    }
}

/// Periodically evicts timed out sessions until shutdown is signalled.
async fn sweep_loop(
    sessions: SessionMap,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Resolves on explicit close and when the store is dropped.
            _ = &mut shutdown_rx => return,
            _ = ticker.tick() => sweep(&sessions),
        }
    }
}

/// One sweeper tick.
///
/// Eviction is rare compared to the number of checks, so a scan under the
/// read lock decides first whether the write lock is needed at all. The
/// rescan under the write lock is required: a concurrent lookup may have
/// refreshed a session between the two phases. Both phases judge against the
/// same instant.
fn sweep(sessions: &RwLock<HashMap<String, Session>>) {
    let now = Instant::now();
    let timed_out =
        |session: &Session| now.saturating_duration_since(session.accessed()) > session.timeout();

    {
        let Ok(map) = sessions.read() else { return };
        if !map.values().any(timed_out) {
            return;
        }
    }

    let Ok(mut map) = sessions.write() else { return };
    map.retain(|id, session| {
        let expired = timed_out(session);
        if expired {
            tracing::debug!(%id, "session timed out");
        }
        !expired
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use websess_core::SessionOptions;

    use super::*;

    #[tokio::test]
    async fn miss_round_trip_and_remove() {
        let store = MemoryStore::new();

        assert!(store.get("asdf").await.unwrap().is_none());

        let session = Session::new().unwrap();
        store.add(session.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let found = store.get(session.id()).await.unwrap().expect("session");
        assert_eq!(found.id(), session.id());
        // The lookup refreshed the shared access time.
        assert!(session.accessed() > session.created());
        // Same underlying session: attributes written through one handle are
        // visible through the other.
        found.set_attr("a", 1);
        assert_eq!(session.attr("a"), Some(json!(1)));

        store.remove(&session).await.unwrap();
        assert!(store.get(session.id()).await.unwrap().is_none());
        // Removing an absent session is a no-op.
        store.remove(&session).await.unwrap();

        store.close().await;
    }

    #[tokio::test]
    async fn sweeper_evicts_idle_sessions() {
        let store = MemoryStore::with_options(&MemoryStoreOptions {
            sweep_interval: Duration::from_millis(10),
        });

        let session = Session::with_options(&SessionOptions {
            timeout: Duration::from_millis(50),
            ..SessionOptions::default()
        })
        .unwrap();
        store.add(session.clone()).await.unwrap();
        assert!(store.get(session.id()).await.unwrap().is_some());

        // Touched again before the timeout elapses: stays alive.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get(session.id()).await.unwrap().is_some());

        // Left idle past timeout plus sweep interval: evicted.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(session.id()).await.unwrap().is_none());

        store.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = MemoryStore::new();
        store.close().await;
        store.close().await;
    }
}
