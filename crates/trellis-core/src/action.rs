//! Action definitions and call contexts
//!
//! An [`Action`] is a model-invokable operation resolved from a context
//! node. Its handler runs under the task engine's discipline: one attempt,
//! with the declared [`Action::on_error`] recovery handler as the only
//! fallback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Agent;
use crate::component::EnabledFn;
use crate::context::ContextState;
use crate::record::{ActionCallRecord, ActionResultRecord};
use crate::schema::Schema;

/// How an action call payload is encoded by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFormat {
    /// Payload is a JSON document matching the action schema
    #[default]
    Json,
    /// Payload is free text handed to the handler as a string
    Text,
}

/// Execution context handed to action handlers and recovery handlers.
#[derive(Clone)]
pub struct ActionCallCx {
    /// State of the context the action was resolved under. Handlers may
    /// read and write its memory.
    pub state: Arc<ContextState>,
    /// The call record; `content` holds the parsed arguments.
    pub call: ActionCallRecord,
}

impl fmt::Debug for ActionCallCx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCallCx")
            .field("context", &self.state.id)
            .field("call", &self.call.id)
            .finish()
    }
}

/// The primary handler of an action.
pub type ActionHandler = Arc<
    dyn Fn(Value, ActionCallCx, Arc<Agent>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Recovery handler: receives the primary handler's error; its result (or
/// its own failure) becomes the task outcome.
pub type ActionRecovery = Arc<
    dyn Fn(anyhow::Error, ActionCallCx, Arc<Agent>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Formatter for an action result's render-ready form.
pub type ActionFormatFn = Arc<dyn Fn(&ActionResultRecord) -> String + Send + Sync>;

/// A model-invokable action.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    /// Argument schema; `None` means the action takes no structured arguments
    pub schema: Option<Schema>,
    pub call_format: CallFormat,
    pub handler: ActionHandler,
    pub on_error: Option<ActionRecovery>,
    pub enabled: Option<EnabledFn>,
    pub format: Option<ActionFormatFn>,
}

impl Action {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, ActionCallCx, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            instructions: None,
            schema: None,
            call_format: CallFormat::default(),
            handler: Arc::new(move |args, cx, agent| Box::pin(handler(args, cx, agent))),
            on_error: None,
            enabled: None,
            format: None,
        }
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

    pub fn call_format(mut self, format: CallFormat) -> Self {
        self.call_format = format;
        self
    }

    /// Declare a recovery handler. When the primary handler fails, the task
    /// engine invokes this with the error and the original failure is not
    /// re-raised.
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(anyhow::Error, ActionCallCx, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |error, cx, agent| {
            Box::pin(f(error, cx, agent))
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
        F: Fn(&ActionResultRecord) -> String + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("call_format", &self.call_format)
            .field("has_schema", &self.schema.is_some())
            .field("has_on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}
