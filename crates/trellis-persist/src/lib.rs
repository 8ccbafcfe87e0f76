//! # Trellis Persist
//!
//! Persistence boundary for context state. The core never calls this crate;
//! the surrounding agent loop saves snapshots after a turn completes and
//! restores them before the next one. Retention is the store's concern —
//! the runtime never destroys context state.
//!
//! - [`StorageBackend`] — object-safe key/value boundary trait
//! - [`MemoryBackend`] — in-process backend for tests and single-shot runs
//! - [`SnapshotStore`] — saves/loads per-context memory snapshots

pub mod backend;
pub mod snapshot;

pub use backend::{MemoryBackend, StorageBackend, StorageError, StorageExt};
pub use snapshot::{ContextSnapshot, SnapshotStore};
