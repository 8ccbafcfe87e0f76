//! Context state store
//!
//! The sole arbiter of context identity within a turn: two lookups with the
//! same definition name and derived key yield the same [`ContextState`],
//! and therefore the same memory object. States are created lazily on first
//! reference and never destroyed here; retention belongs to the persistence
//! layer. Concurrent turns touching the same context key require external
//! serialization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::context::{ContextRef, ContextState};
use crate::error::ContextError;

/// In-memory identity map for context states.
#[derive(Debug, Default)]
pub struct ContextStore {
    states: RwLock<HashMap<String, Arc<ContextState>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the state a reference identifies, creating it with default
    /// memory on first use. Arguments are validated against the context
    /// schema before the key is derived.
    pub async fn get(&self, reference: &ContextRef) -> Result<Arc<ContextState>, ContextError> {
        if let Some(schema) = &reference.context.schema {
            schema
                .validate(&reference.args)
                .map_err(|err| ContextError::InvalidArgs {
                    context: reference.context.name.clone(),
                    reason: err.to_string(),
                })?;
        }

        let id = reference.id();
        if let Some(state) = self.states.read().await.get(&id) {
            return Ok(Arc::clone(state));
        }

        let mut states = self.states.write().await;
        // Re-check under the write lock: a concurrent lookup may have won.
        let state = states.entry(id).or_insert_with(|| {
            debug!(context = %reference.context.name, id = %reference.id(), "creating context state");
            Arc::new(ContextState::new(
                Arc::clone(&reference.context),
                reference.args.clone(),
            ))
        });
        Ok(Arc::clone(state))
    }

    /// Fetch a state by composite id without creating it.
    pub async fn get_by_id(&self, id: &str) -> Option<Arc<ContextState>> {
        self.states.read().await.get(id).cloned()
    }

    /// Insert a pre-built state (used when hydrating from persistence).
    pub async fn insert(&self, state: Arc<ContextState>) {
        self.states
            .write()
            .await
            .insert(state.id.clone(), state);
    }

    /// Snapshot of every live state.
    pub async fn states(&self) -> Vec<Arc<ContextState>> {
        self.states.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}
