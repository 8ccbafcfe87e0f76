//! Input and output definitions
//!
//! Inputs and outputs are declared on a context as a named record
//! (`name -> config`); the tree builder attaches the names when it resolves
//! a node's components. Handlers are optional; a definition without one is
//! purely descriptive and only shapes what the renderer shows the model.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::agent::Agent;
use crate::context::ContextState;
use crate::record::OutputRecord;
use crate::schema::Schema;

/// Handler invoked when a record reaches its owning context. Receives the
/// record content, the owning state, and the agent; returns the processed
/// content.
pub type ComponentHandler = Arc<
    dyn Fn(Value, Arc<ContextState>, Arc<Agent>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Predicate gating a definition on the current state.
pub type EnabledFn = Arc<dyn Fn(&ContextState) -> bool + Send + Sync>;

/// Formatter for an output record's render-ready form.
pub type OutputFormatFn = Arc<dyn Fn(&OutputRecord) -> String + Send + Sync>;

/// A named input definition.
#[derive(Clone)]
pub struct InputDef {
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<Schema>,
    pub handler: Option<ComponentHandler>,
    pub enabled: Option<EnabledFn>,
}

impl fmt::Debug for InputDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// An input definition before a name is attached: the value side of the
/// named record a context declares.
#[derive(Clone, Default)]
pub struct InputConfig {
    pub description: Option<String>,
    pub schema: Option<Schema>,
    pub handler: Option<ComponentHandler>,
    pub enabled: Option<EnabledFn>,
}

impl InputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, Arc<ContextState>, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |content, state, agent| {
            Box::pin(f(content, state, agent))
        }));
        self
    }

    pub fn enabled<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextState) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(f));
        self
    }

    /// Attach the record key as the definition's name.
    pub fn named(self, name: impl Into<String>) -> InputDef {
        InputDef {
            name: name.into(),
            description: self.description,
            schema: self.schema,
            handler: self.handler,
            enabled: self.enabled,
        }
    }
}

/// A named output definition.
#[derive(Clone)]
pub struct OutputDef {
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub schema: Option<Schema>,
    pub handler: Option<ComponentHandler>,
    pub enabled: Option<EnabledFn>,
    pub format: Option<OutputFormatFn>,
}

impl fmt::Debug for OutputDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// An output definition before a name is attached.
#[derive(Clone, Default)]
pub struct OutputConfig {
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub schema: Option<Schema>,
    pub handler: Option<ComponentHandler>,
    pub enabled: Option<EnabledFn>,
    pub format: Option<OutputFormatFn>,
}

impl OutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, Arc<ContextState>, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |content, state, agent| {
            Box::pin(f(content, state, agent))
        }));
        self
    }

    pub fn enabled<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextState) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(f));
        self
    }

    pub fn format<F>(mut self, f: F) -> Self
    where
        F: Fn(&OutputRecord) -> String + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(f));
        self
    }

    /// Attach the record key as the definition's name.
    pub fn named(self, name: impl Into<String>) -> OutputDef {
        OutputDef {
            name: name.into(),
            description: self.description,
            instructions: self.instructions,
            schema: self.schema,
            handler: self.handler,
            enabled: self.enabled,
            format: self.format,
        }
    }
}
