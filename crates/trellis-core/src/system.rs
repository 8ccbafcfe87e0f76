//! Systems: pluggable bundles of stage-handler overrides
//!
//! A [`System`] attaches to a context definition (or to the agent itself,
//! seeding the tree root) and contributes optional overrides for the
//! canonical processing stages. Every hook has the uniform shape
//! `(params, next) -> result`, where `next` is the next-more-general
//! effective handler: another system's hook further up the tree, or the
//! canonical default. A hook can decorate `next`, replace it, or veto the
//! stage by returning an error. A `None` entry is transparent for that
//! stage.
//!
//! Systems are stateless configuration: they own no context memory, and
//! dispatch over them is pure: the same node path and system lists always
//! produce the same effective handler.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::action::{Action, ActionCallCx};
use crate::agent::Agent;
use crate::component::{InputDef, OutputDef};
use crate::context::ContextState;
use crate::error::Result;
use crate::record::{ActionCallRecord, ActionResultRecord, InputRecord, OutputRecord, Record};

/// Effective handler for one stage.
pub type StageFn<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// A system's override for one stage; `next` is the next-more-general
/// handler.
pub type StageHook<P, R> =
    Arc<dyn Fn(P, StageFn<P, R>) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Parameters every stage sees: the active context state and the agent.
#[derive(Clone)]
pub struct StageCx {
    pub state: Arc<ContextState>,
    pub agent: Arc<Agent>,
}

impl fmt::Debug for StageCx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageCx")
            .field("context", &self.state.id)
            .finish()
    }
}

/// Parse stage: decode a call's raw payload into arguments.
#[derive(Debug, Clone)]
pub struct ParseActionCallCx {
    pub cx: StageCx,
    pub action: Arc<Action>,
    pub call: ActionCallRecord,
}

/// Resolve stage: select the action a call names.
#[derive(Debug, Clone)]
pub struct ResolveActionCallCx {
    pub cx: StageCx,
    pub call: ActionCallRecord,
    /// Actions visible from the active node, most specific first
    pub candidates: Vec<Arc<Action>>,
}

/// Resolve stage: select the input a record names.
#[derive(Debug, Clone)]
pub struct ResolveInputCx {
    pub cx: StageCx,
    pub record: InputRecord,
    pub candidates: Vec<Arc<InputDef>>,
}

/// Resolve stage: select the output a record names.
#[derive(Debug, Clone)]
pub struct ResolveOutputCx {
    pub cx: StageCx,
    pub record: OutputRecord,
    pub candidates: Vec<Arc<OutputDef>>,
}

/// Prepare stage: validate arguments and build the call context.
#[derive(Debug, Clone)]
pub struct PrepareActionCallCx {
    pub cx: StageCx,
    pub action: Arc<Action>,
    pub call: ActionCallRecord,
}

/// Handle stage: execute the prepared call.
#[derive(Debug, Clone)]
pub struct HandleActionCallCx {
    pub cx: StageCx,
    pub action: Arc<Action>,
    pub call_cx: ActionCallCx,
}

/// Handle stage: process one input record.
#[derive(Debug, Clone)]
pub struct HandleInputCx {
    pub cx: StageCx,
    pub input: Arc<InputDef>,
    pub record: InputRecord,
}

/// Handle stage: process one output record.
#[derive(Debug, Clone)]
pub struct HandleOutputCx {
    pub cx: StageCx,
    pub output: Arc<OutputDef>,
    pub record: OutputRecord,
}

/// Prepare-run stage: build and expand the tree for a turn.
#[derive(Debug, Clone)]
pub struct PrepareRunCx {
    pub cx: StageCx,
}

/// Run stage: drain a batch of records through the pipeline.
#[derive(Debug, Clone)]
pub struct RunCx {
    pub cx: StageCx,
    pub records: Vec<Record>,
}

/// Per-stage override table. `None` entries are transparent: dispatch falls
/// through to the next-more-general system and ultimately the canonical
/// default.
#[derive(Clone, Default)]
pub struct SystemHooks {
    pub parse_action_call: Option<StageHook<ParseActionCallCx, Value>>,
    pub resolve_action_call: Option<StageHook<ResolveActionCallCx, Arc<Action>>>,
    pub resolve_input: Option<StageHook<ResolveInputCx, Arc<InputDef>>>,
    pub resolve_output: Option<StageHook<ResolveOutputCx, Arc<OutputDef>>>,
    pub prepare_action_call: Option<StageHook<PrepareActionCallCx, ActionCallCx>>,
    pub handle_action_call: Option<StageHook<HandleActionCallCx, ActionResultRecord>>,
    pub handle_input: Option<StageHook<HandleInputCx, InputRecord>>,
    pub handle_output: Option<StageHook<HandleOutputCx, OutputRecord>>,
    pub prepare_run: Option<StageHook<PrepareRunCx, ()>>,
    pub run: Option<StageHook<RunCx, Vec<Record>>>,
}

/// A named bundle of stage overrides.
#[derive(Clone)]
pub struct System {
    pub name: String,
    pub hooks: SystemHooks,
}

macro_rules! hook_setter {
    ($(#[$doc:meta])* $method:ident, $field:ident, $params:ty, $result:ty) => {
        $(#[$doc])*
        pub fn $method<F, Fut>(mut self, hook: F) -> Self
        where
            F: Fn($params, StageFn<$params, $result>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<$result>> + Send + 'static,
        {
            self.hooks.$field = Some(Arc::new(move |params, next| Box::pin(hook(params, next))));
            self
        }
    };
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: SystemHooks::default(),
        }
    }

    hook_setter!(
        /// Override payload parsing for action calls.
        on_parse_action_call, parse_action_call, ParseActionCallCx, Value);
    hook_setter!(
        /// Override action-call resolution.
        on_resolve_action_call, resolve_action_call, ResolveActionCallCx, Arc<Action>);
    hook_setter!(
        /// Override input resolution.
        on_resolve_input, resolve_input, ResolveInputCx, Arc<InputDef>);
    hook_setter!(
        /// Override output resolution.
        on_resolve_output, resolve_output, ResolveOutputCx, Arc<OutputDef>);
    hook_setter!(
        /// Override call preparation (validation, call-context construction).
        on_prepare_action_call, prepare_action_call, PrepareActionCallCx, ActionCallCx);
    hook_setter!(
        /// Override call execution.
        on_handle_action_call, handle_action_call, HandleActionCallCx, ActionResultRecord);
    hook_setter!(
        /// Override input handling.
        on_handle_input, handle_input, HandleInputCx, InputRecord);
    hook_setter!(
        /// Override output handling.
        on_handle_output, handle_output, HandleOutputCx, OutputRecord);
    hook_setter!(
        /// Override turn preparation.
        on_prepare_run, prepare_run, PrepareRunCx, ());
    hook_setter!(
        /// Override the run loop.
        on_run, run, RunCx, Vec<Record>);
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_hooks_are_transparent() {
        let system = System::new("audit").on_handle_input(|params, next| next(params));
        assert!(system.hooks.handle_input.is_some());
        assert!(system.hooks.handle_action_call.is_none());
        assert!(system.hooks.run.is_none());
    }
}
