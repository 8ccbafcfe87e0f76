//! Context-owned mutable memory

use serde_json::Value;
use tokio::sync::RwLock;

/// Opaque mutable memory owned by a single context state.
///
/// The store hands out exactly one instance per context identity, so two
/// lookups with the same name and key share this object. Only handlers
/// resolved for the owning context (or a system explicitly granted the
/// state) should mutate it.
#[derive(Debug)]
pub struct ContextMemory {
    content: RwLock<Value>,
}

impl ContextMemory {
    pub fn new(initial: Value) -> Self {
        Self {
            content: RwLock::new(initial),
        }
    }

    /// Snapshot of the current content.
    pub async fn read(&self) -> Value {
        self.content.read().await.clone()
    }

    /// Replace the content wholesale.
    pub async fn replace(&self, content: Value) {
        *self.content.write().await = content;
    }

    /// Apply a mutation under the write lock.
    pub async fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Value),
    {
        mutate(&mut *self.content.write().await);
    }
}

impl Default for ContextMemory {
    fn default() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }
}
