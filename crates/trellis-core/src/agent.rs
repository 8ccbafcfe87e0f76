//! The agent capability bag
//!
//! An [`Agent`] is an opaque bag of capabilities passed by reference into
//! every resolver and handler: the context store (identity arbiter), the
//! model boundary, and the agent-level systems seeded into every tree root.
//! The runtime never inspects it beyond what a handler chooses to use.

use std::fmt;
use std::sync::Arc;

use crate::model::LanguageModel;
use crate::store::ContextStore;
use crate::system::System;

/// Shared handle to an agent.
pub type AgentHandle = Arc<Agent>;

/// Capability bag for one agent.
pub struct Agent {
    /// Context state store
    pub ctxs: Arc<ContextStore>,
    /// Language-model boundary
    pub model: Arc<dyn LanguageModel>,
    /// Agent-level systems, most general in the override order
    pub systems: Vec<Arc<System>>,
}

impl Agent {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            ctxs: Arc::new(ContextStore::new()),
            model,
            systems: Vec::new(),
        }
    }

    /// Attach an agent-level system.
    pub fn with_system(mut self, system: Arc<System>) -> Self {
        self.systems.push(system);
        self
    }

    pub fn into_handle(self) -> AgentHandle {
        Arc::new(self)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.model.name())
            .field(
                "systems",
                &self.systems.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
