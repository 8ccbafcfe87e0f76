//! Context state snapshots
//!
//! A [`SnapshotStore`] persists the durable half of a context state (its
//! arguments and memory content) keyed by the state's composite id. The
//! working-memory log is per-turn and is not persisted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{StorageBackend, StorageError, StorageExt};
use trellis_core::{ContextRef, ContextState, ContextStore};

/// Serializable snapshot of one context state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Composite id (`name` or `name:key`)
    pub id: String,
    /// Context definition name
    pub context: String,
    /// Derived key component
    pub key: String,
    /// Instantiation arguments
    pub args: Value,
    /// Memory content at save time
    pub memory: Value,
    pub stored_at: DateTime<Utc>,
}

/// Snapshot store over any storage backend.
#[derive(Debug)]
pub struct SnapshotStore<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
    prefix: String,
}

impl<B: StorageBackend + ?Sized> SnapshotStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            prefix: "ctx:".to_string(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Save one state's snapshot.
    pub async fn save(&self, state: &ContextState) -> Result<(), StorageError> {
        let snapshot = ContextSnapshot {
            id: state.id.clone(),
            context: state.context.name.clone(),
            key: state.key.clone(),
            args: state.args.clone(),
            memory: state.memory.read().await,
            stored_at: Utc::now(),
        };
        debug!(id = %snapshot.id, "saving context snapshot");
        self.backend.set(&self.key(&state.id), &snapshot).await
    }

    /// Load a snapshot by composite id.
    pub async fn load(&self, id: &str) -> Result<Option<ContextSnapshot>, StorageError> {
        self.backend.get(&self.key(id)).await
    }

    /// Restore a reference's state from its snapshot, if one exists: the
    /// state is created (or fetched) through the store so identity is
    /// preserved, then its memory is replaced with the saved content.
    pub async fn restore(
        &self,
        store: &ContextStore,
        reference: &ContextRef,
    ) -> Result<Option<Arc<ContextState>>, StorageError> {
        let Some(snapshot) = self.load(&reference.id()).await? else {
            return Ok(None);
        };
        let state = store
            .get(reference)
            .await
            .map_err(|err| StorageError::Internal(err.to_string()))?;
        state.memory.replace(snapshot.memory).await;
        Ok(Some(state))
    }

    /// Save every live state in a store. Returns how many were written.
    pub async fn flush(&self, store: &ContextStore) -> Result<usize, StorageError> {
        let states = store.states().await;
        let count = states.len();
        for state in states {
            self.save(&state).await?;
        }
        Ok(count)
    }

    /// Delete a snapshot; returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.key(id)).await
    }

    /// Ids of every stored snapshot.
    pub async fn list_ids(&self) -> Result<Vec<String>, StorageError> {
        let keys = self.backend.list_keys(&self.prefix).await?;
        Ok(keys
            .into_iter()
            .map(|key| key[self.prefix.len()..].to_string())
            .collect())
    }
}
