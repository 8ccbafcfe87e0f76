//! # Trellis Runtime
//!
//! The engines behind a Trellis agent turn:
//! - [`tree`] — builds the tree of active contexts and lazily resolves each
//!   node's children and capability surface
//! - [`dispatch`] — composes the systems along a node's path into the
//!   effective handler for each processing stage
//! - [`task`] — executes action handlers under one discipline: a single
//!   attempt with explicit recovery
//! - [`engine`] — wires the three together for one turn
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis_core::{Agent, Action, ContextDef, ContextRef, Resolver};
//! use trellis_runtime::{Engine, MockModel};
//!
//! let agent = Agent::new(Arc::new(MockModel::constant("ok"))).into_handle();
//! let chat = Arc::new(
//!     ContextDef::new("chat")
//!         .key(|args| args["userId"].as_str().unwrap_or_default().to_string())
//!         .actions(Resolver::value(vec![Arc::new(Action::new(
//!             "echo",
//!             |args, _cx, _agent| async move { Ok(args) },
//!         ))])),
//! );
//!
//! let mut engine = Engine::new(agent);
//! engine.prepare_run(&ContextRef::new(chat, json!({"userId": "u1"}))).await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod handlers;
pub mod mock;
pub mod task;
pub mod tree;

pub use config::RuntimeConfig;
pub use dispatch::SystemChain;
pub use engine::Engine;
pub use mock::MockModel;
pub use task::{run_action_task, TaskOutcome, TaskState};
pub use tree::{
    create_context_node, create_context_tree_root, resolve_node_children,
    resolve_node_components, resolve_tree, ContextTreeNode, ContextTreeRoot, Lazy,
    NodeComponents, NodeParent,
};
