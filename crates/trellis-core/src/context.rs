//! Context definitions, references, and states
//!
//! A context is a scoped unit of conversational/task state: it owns memory,
//! declares capabilities (inputs, outputs, actions), and may declare child
//! contexts (`uses`) and attached systems. [`ContextDef`] is the immutable,
//! author-time description; [`ContextState`] is a live instance bound to
//! concrete arguments; [`ContextRef`] is how one context points at another.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::action::Action;
use crate::component::{InputConfig, OutputConfig};
use crate::memory::ContextMemory;
use crate::record::{Record, WorkingMemory};
use crate::resolver::{NamedRecord, Resolver};
use crate::schema::Schema;
use crate::system::System;

/// Derives the state key from instantiation arguments.
pub type KeyFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Produces the initial memory content for a fresh state.
pub type InitialMemoryFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Immutable, author-time description of a context type.
#[derive(Clone)]
pub struct ContextDef {
    /// Identifier, unique across the agent
    pub name: String,
    /// Validator for instantiation arguments
    pub schema: Option<Schema>,
    /// Identity function; same name + same key means same state. Absent
    /// means the context is a singleton.
    pub key: Option<KeyFn>,
    /// Initial memory factory; defaults to an empty object
    pub initial: Option<InitialMemoryFn>,
    /// Model-facing guidance, consumed by the renderer
    pub instructions: Option<Resolver<String>>,
    pub inputs: Option<Resolver<NamedRecord<InputConfig>>>,
    pub outputs: Option<Resolver<NamedRecord<OutputConfig>>>,
    pub actions: Option<Resolver<Vec<Arc<Action>>>>,
    /// Child contexts active under this one for the current turn
    pub uses: Option<Resolver<Vec<ContextRef>>>,
    /// Cross-cutting systems attached to this node
    pub systems: Option<Resolver<Vec<Arc<System>>>>,
}

impl ContextDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            key: None,
            initial: None,
            instructions: None,
            inputs: None,
            outputs: None,
            actions: None,
            uses: None,
            systems: None,
        }
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn key<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.key = Some(Arc::new(f));
        self
    }

    pub fn initial<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.initial = Some(Arc::new(f));
        self
    }

    pub fn instructions(mut self, resolver: Resolver<String>) -> Self {
        self.instructions = Some(resolver);
        self
    }

    pub fn inputs(mut self, resolver: Resolver<NamedRecord<InputConfig>>) -> Self {
        self.inputs = Some(resolver);
        self
    }

    pub fn outputs(mut self, resolver: Resolver<NamedRecord<OutputConfig>>) -> Self {
        self.outputs = Some(resolver);
        self
    }

    pub fn actions(mut self, resolver: Resolver<Vec<Arc<Action>>>) -> Self {
        self.actions = Some(resolver);
        self
    }

    pub fn uses(mut self, resolver: Resolver<Vec<ContextRef>>) -> Self {
        self.uses = Some(resolver);
        self
    }

    pub fn systems(mut self, resolver: Resolver<Vec<Arc<System>>>) -> Self {
        self.systems = Some(resolver);
        self
    }

    /// State key for the given arguments; key-less definitions are
    /// singletons with the empty key.
    pub fn state_key(&self, args: &Value) -> String {
        self.key.as_ref().map(|f| f(args)).unwrap_or_default()
    }

    /// Composite identity: `name`, or `name:key` when a key fn is declared.
    pub fn state_id(&self, args: &Value) -> String {
        let key = self.state_key(args);
        if key.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, key)
        }
    }

    /// Memory content for a fresh state.
    pub fn initial_memory(&self, args: &Value) -> Value {
        match &self.initial {
            Some(f) => f(args),
            None => Value::Object(serde_json::Map::new()),
        }
    }
}

impl fmt::Debug for ContextDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextDef")
            .field("name", &self.name)
            .field("has_schema", &self.schema.is_some())
            .field("has_key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

/// A reference to a context instance: the definition plus instantiation
/// arguments. Resolving a reference through the store yields the (shared)
/// state it identifies.
#[derive(Clone)]
pub struct ContextRef {
    pub context: Arc<ContextDef>,
    pub args: Value,
}

impl ContextRef {
    pub fn new(context: Arc<ContextDef>, args: Value) -> Self {
        Self { context, args }
    }

    pub fn key(&self) -> String {
        self.context.state_key(&self.args)
    }

    pub fn id(&self) -> String {
        self.context.state_id(&self.args)
    }
}

impl fmt::Debug for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRef")
            .field("id", &self.id())
            .finish()
    }
}

/// A live instance of a context definition, bound to concrete arguments.
pub struct ContextState {
    pub context: Arc<ContextDef>,
    pub args: Value,
    /// Composite identity (`name` or `name:key`)
    pub id: String,
    /// Derived key component
    pub key: String,
    /// Context-owned mutable memory; shared by every reference to this state
    pub memory: Arc<ContextMemory>,
    /// Working-memory log for the current turn
    pub wm: Arc<RwLock<WorkingMemory>>,
}

impl ContextState {
    pub fn new(context: Arc<ContextDef>, args: Value) -> Self {
        let key = context.state_key(&args);
        let id = context.state_id(&args);
        let memory = Arc::new(ContextMemory::new(context.initial_memory(&args)));
        Self {
            context,
            args,
            id,
            key,
            memory,
            wm: Arc::new(RwLock::new(WorkingMemory::new())),
        }
    }

    /// Append a record to this state's working memory.
    pub async fn push_record(&self, record: Record) {
        self.wm.write().await.push(record);
    }

    /// Snapshot of the working-memory chain.
    pub async fn chain(&self) -> Vec<Record> {
        self.wm.read().await.records().to_vec()
    }
}

impl fmt::Debug for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextState")
            .field("id", &self.id)
            .field("context", &self.context.name)
            .finish_non_exhaustive()
    }
}
