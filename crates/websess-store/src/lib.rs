//! In-memory session store backend.
//!
//! Provides `MemoryStore`: a concurrent map of live sessions with a
//! background sweeper task that evicts sessions idle longer than their
//! timeout.

pub mod memory;

pub use memory::{MemoryStore, MemoryStoreOptions};
