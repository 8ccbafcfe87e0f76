//! # Trellis Core
//!
//! Data model for the Trellis agent runtime:
//! - [`ContextDef`] / [`ContextState`] — scoped units of conversational state
//!   with their own memory and declared capabilities
//! - [`Resolver`] — value-or-function capability resolvers
//! - [`System`] — pluggable bundles of stage-handler overrides
//! - [`Record`] / [`WorkingMemory`] — the append-ordered log of a turn
//! - [`ContextStore`] — identity arbiter for context states
//! - [`LanguageModel`] — the model boundary trait
//!
//! The engines that consume these types (tree builder, systems dispatch,
//! task execution) live in `trellis-runtime`.

pub mod action;
pub mod agent;
pub mod component;
pub mod context;
pub mod error;
pub mod memory;
pub mod model;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod system;

pub use action::{Action, ActionCallCx, ActionHandler, ActionRecovery, CallFormat};
pub use agent::{Agent, AgentHandle};
pub use component::{EnabledFn, InputConfig, InputDef, OutputConfig, OutputDef};
pub use context::{ContextDef, ContextRef, ContextState};
pub use error::{ContextError, DispatchError, Result, RuntimeError, TaskError};
pub use memory::ContextMemory;
pub use model::{LanguageModel, ModelError, ModelRequest, ModelResponse};
pub use record::{
    ActionCallRecord, ActionResultRecord, InputRecord, OutputRecord, Record, WorkingMemory,
};
pub use resolver::{resolve_named_record, resolve_or_default, NamedRecord, Resolver};
pub use schema::{Schema, SchemaError};
pub use store::ContextStore;
pub use system::{
    HandleActionCallCx, HandleInputCx, HandleOutputCx, ParseActionCallCx, PrepareActionCallCx,
    PrepareRunCx, ResolveActionCallCx, ResolveInputCx, ResolveOutputCx, RunCx, StageCx, StageFn,
    StageHook, System, SystemHooks,
};
