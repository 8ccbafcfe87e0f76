//! Turn engine
//!
//! Wires the three engines into one turn: `prepare_run` builds and expands
//! the context tree, then each record routes through the effective stage
//! handlers of its owning node (parse, resolve, prepare, handle) with the
//! task engine doing the final execution. Records are processed
//! sequentially relative to one agent run; only child-subtree resolution
//! inside the tree builder runs concurrently.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use trellis_core::{
    Action, ActionCallRecord, ActionResultRecord, Agent, ContextRef, DispatchError,
    HandleActionCallCx, HandleInputCx, HandleOutputCx, InputDef, InputRecord, OutputDef,
    OutputRecord, ParseActionCallCx, PrepareActionCallCx, PrepareRunCx, Record,
    ResolveActionCallCx, ResolveInputCx, ResolveOutputCx, Result, RunCx, StageCx, StageFn,
};

use crate::config::RuntimeConfig;
use crate::dispatch::SystemChain;
use crate::handlers::action::{
    handle_action_call_stage, parse_action_call_stage, prepare_action_call_stage,
    resolve_action_call_stage,
};
use crate::handlers::input::{handle_input_stage, resolve_input_stage};
use crate::handlers::output::{handle_output_stage, resolve_output_stage};
use crate::tree::{create_context_tree_root, resolve_tree, ContextTreeNode, ContextTreeRoot};

/// Drives one turn of an agent.
pub struct Engine {
    agent: Arc<Agent>,
    config: RuntimeConfig,
    root: Option<Arc<ContextTreeRoot>>,
}

impl Engine {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            config: RuntimeConfig::default(),
            root: None,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// The tree prepared for this turn, if any.
    pub fn root(&self) -> Option<&Arc<ContextTreeRoot>> {
        self.root.as_ref()
    }

    /// Prepare a turn for the given entry context: look up (or create) its
    /// state, build the tree root seeded with the agent-level systems, and
    /// fully expand it through the `prepare_run` stage, so systems can
    /// intercept or replace the expansion.
    pub async fn prepare_run(&mut self, reference: &ContextRef) -> Result<()> {
        let state = self.agent.ctxs.get(reference).await?;
        let root = Arc::new(
            create_context_tree_root(Arc::clone(&state), &self.agent, self.agent.systems.clone())
                .await?,
        );

        let chain = SystemChain::for_node(&root.node);
        let default: StageFn<PrepareRunCx, ()> = {
            let node = Arc::clone(&root.node);
            let agent = Arc::clone(&self.agent);
            let max_depth = self.config.max_tree_depth;
            Arc::new(move |_params| {
                let node = Arc::clone(&node);
                let agent = Arc::clone(&agent);
                Box::pin(async move { resolve_tree(&node, &agent, max_depth).await })
            })
        };
        let handler = chain.effective(|hooks| hooks.prepare_run.clone(), default);
        handler(PrepareRunCx {
            cx: StageCx {
                state,
                agent: Arc::clone(&self.agent),
            },
        })
        .await?;

        debug!(context = %root.node.ctx.id, "turn prepared");
        self.root = Some(root);
        Ok(())
    }

    /// Route one input record to its owning node.
    pub async fn post_input(&self, record: InputRecord) -> Result<InputRecord> {
        let root = self.root.as_ref().ok_or(DispatchError::NotPrepared)?;
        route_input(&self.agent, root, record).await
    }

    /// Route one output record to its owning node.
    pub async fn post_output(&self, record: OutputRecord) -> Result<OutputRecord> {
        let root = self.root.as_ref().ok_or(DispatchError::NotPrepared)?;
        route_output(&self.agent, root, record).await
    }

    /// Route one action call through parse, resolve, prepare, and handle.
    pub async fn post_action_call(&self, call: ActionCallRecord) -> Result<ActionResultRecord> {
        let root = self.root.as_ref().ok_or(DispatchError::NotPrepared)?;
        route_action_call(&self.agent, root, call).await
    }

    /// Drain a batch of records through the pipeline sequentially, via the
    /// `run` stage. Any propagated error aborts the batch; there is no
    /// partial-success shape.
    pub async fn run(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let root = self.root.as_ref().ok_or(DispatchError::NotPrepared)?;
        if records.len() > self.config.max_run_records {
            return Err(DispatchError::BatchOverflow {
                limit: self.config.max_run_records,
            }
            .into());
        }

        let chain = SystemChain::for_node(&root.node);
        let default: StageFn<RunCx, Vec<Record>> = {
            let agent = Arc::clone(&self.agent);
            let root = Arc::clone(root);
            Arc::new(move |params: RunCx| {
                let agent = Arc::clone(&agent);
                let root = Arc::clone(&root);
                Box::pin(async move { run_batch(&agent, &root, params.records).await })
            })
        };
        let handler = chain.effective(|hooks| hooks.run.clone(), default);
        handler(RunCx {
            cx: StageCx {
                state: Arc::clone(&root.node.ctx),
                agent: Arc::clone(&self.agent),
            },
            records,
        })
        .await
    }
}

async fn run_batch(
    agent: &Arc<Agent>,
    root: &Arc<ContextTreeRoot>,
    records: Vec<Record>,
) -> Result<Vec<Record>> {
    let mut chain = Vec::with_capacity(records.len());
    for record in records {
        match record {
            Record::Input(input) => {
                chain.push(Record::Input(route_input(agent, root, input).await?));
            }
            Record::Output(output) => {
                chain.push(Record::Output(route_output(agent, root, output).await?));
            }
            Record::ActionCall(call) => {
                chain.push(Record::ActionResult(
                    route_action_call(agent, root, call).await?,
                ));
            }
            // Results in the inbox pass through untouched.
            Record::ActionResult(result) => chain.push(Record::ActionResult(result)),
        }
    }
    Ok(chain)
}

async fn route_action_call(
    agent: &Arc<Agent>,
    root: &Arc<ContextTreeRoot>,
    call: ActionCallRecord,
) -> Result<ActionResultRecord> {
    let node = locate_node(&root.node, &call.name, Surface::Actions)
        .await
        .ok_or_else(|| DispatchError::UnknownAction {
            name: call.name.clone(),
        })?;
    let candidates = action_candidates(&node).await;
    let chain = SystemChain::for_node(&node);
    let cx = StageCx {
        state: Arc::clone(&node.ctx),
        agent: Arc::clone(agent),
    };

    let resolve = chain.effective(
        |hooks| hooks.resolve_action_call.clone(),
        resolve_action_call_stage(),
    );
    let action = resolve(ResolveActionCallCx {
        cx: cx.clone(),
        call: call.clone(),
        candidates,
    })
    .await?;

    // Parse only when the call still carries an unparsed payload.
    let call = if call.raw.is_some() {
        let parse = chain.effective(
            |hooks| hooks.parse_action_call.clone(),
            parse_action_call_stage(),
        );
        let content = parse(ParseActionCallCx {
            cx: cx.clone(),
            action: Arc::clone(&action),
            call: call.clone(),
        })
        .await?;
        ActionCallRecord { content, ..call }
    } else {
        call
    };

    let prepare = chain.effective(
        |hooks| hooks.prepare_action_call.clone(),
        prepare_action_call_stage(),
    );
    let call_cx = prepare(PrepareActionCallCx {
        cx: cx.clone(),
        action: Arc::clone(&action),
        call,
    })
    .await?;

    let handle = chain.effective(
        |hooks| hooks.handle_action_call.clone(),
        handle_action_call_stage(),
    );
    handle(HandleActionCallCx {
        cx,
        action,
        call_cx,
    })
    .await
}

async fn route_input(
    agent: &Arc<Agent>,
    root: &Arc<ContextTreeRoot>,
    record: InputRecord,
) -> Result<InputRecord> {
    let node = locate_node(&root.node, &record.name, Surface::Inputs)
        .await
        .ok_or_else(|| DispatchError::UnknownInput {
            name: record.name.clone(),
        })?;
    let candidates = input_candidates(&node).await;
    let chain = SystemChain::for_node(&node);
    let cx = StageCx {
        state: Arc::clone(&node.ctx),
        agent: Arc::clone(agent),
    };

    let resolve = chain.effective(|hooks| hooks.resolve_input.clone(), resolve_input_stage());
    let input = resolve(ResolveInputCx {
        cx: cx.clone(),
        record: record.clone(),
        candidates,
    })
    .await?;

    let handle = chain.effective(|hooks| hooks.handle_input.clone(), handle_input_stage());
    handle(HandleInputCx { cx, input, record }).await
}

async fn route_output(
    agent: &Arc<Agent>,
    root: &Arc<ContextTreeRoot>,
    record: OutputRecord,
) -> Result<OutputRecord> {
    let node = locate_node(&root.node, &record.name, Surface::Outputs)
        .await
        .ok_or_else(|| DispatchError::UnknownOutput {
            name: record.name.clone(),
        })?;
    let candidates = output_candidates(&node).await;
    let chain = SystemChain::for_node(&node);
    let cx = StageCx {
        state: Arc::clone(&node.ctx),
        agent: Arc::clone(agent),
    };

    let resolve = chain.effective(|hooks| hooks.resolve_output.clone(), resolve_output_stage());
    let output = resolve(ResolveOutputCx {
        cx: cx.clone(),
        record: record.clone(),
        candidates,
    })
    .await?;

    let handle = chain.effective(|hooks| hooks.handle_output.clone(), handle_output_stage());
    handle(HandleOutputCx { cx, output, record }).await
}

#[derive(Clone, Copy)]
enum Surface {
    Inputs,
    Outputs,
    Actions,
}

/// Find the deepest resolved node whose capability surface declares `name`.
/// Depth-first so a child context shadows its parent for the same name.
fn locate_node<'a>(
    node: &'a Arc<ContextTreeNode>,
    name: &'a str,
    surface: Surface,
) -> BoxFuture<'a, Option<Arc<ContextTreeNode>>> {
    Box::pin(async move {
        for child in node.children().await.unwrap_or_default() {
            if let Some(found) = locate_node(&child, name, surface).await {
                return Some(found);
            }
        }
        let components = node.components().await?;
        let declared = match surface {
            Surface::Inputs => components.inputs.iter().any(|i| i.name == name),
            Surface::Outputs => components.outputs.iter().any(|o| o.name == name),
            Surface::Actions => components.actions.iter().any(|a| a.name == name),
        };
        declared.then(|| Arc::clone(node))
    })
}

async fn action_candidates(node: &Arc<ContextTreeNode>) -> Vec<Arc<Action>> {
    let mut candidates = Vec::new();
    let mut current = Some(Arc::clone(node));
    while let Some(n) = current {
        if let Some(components) = n.components().await {
            candidates.extend(components.actions.iter().cloned());
        }
        current = n.parent();
    }
    candidates
}

async fn input_candidates(node: &Arc<ContextTreeNode>) -> Vec<Arc<InputDef>> {
    let mut candidates = Vec::new();
    let mut current = Some(Arc::clone(node));
    while let Some(n) = current {
        if let Some(components) = n.components().await {
            candidates.extend(components.inputs.iter().cloned());
        }
        current = n.parent();
    }
    candidates
}

async fn output_candidates(node: &Arc<ContextTreeNode>) -> Vec<Arc<OutputDef>> {
    let mut candidates = Vec::new();
    let mut current = Some(Arc::clone(node));
    while let Some(n) = current {
        if let Some(components) = n.components().await {
            candidates.extend(components.outputs.iter().cloned());
        }
        current = n.parent();
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModel;
    use serde_json::{json, Value};
    use trellis_core::{ContextDef, Resolver, RuntimeError};

    fn agent() -> Arc<Agent> {
        Agent::new(Arc::new(MockModel::constant("ok"))).into_handle()
    }

    fn echo_def() -> Arc<ContextDef> {
        Arc::new(
            ContextDef::new("echo").actions(Resolver::value(vec![Arc::new(Action::new(
                "echo",
                |args, _cx, _agent| async move { Ok(args) },
            ))])),
        )
    }

    #[tokio::test]
    async fn run_before_prepare_is_rejected() {
        let engine = Engine::new(agent());
        let err = engine.run(Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::NotPrepared)
        ));
    }

    #[tokio::test]
    async fn batch_overflow_is_rejected() {
        let mut engine = Engine::new(agent()).with_config(RuntimeConfig {
            max_run_records: 1,
            ..RuntimeConfig::default()
        });
        engine
            .prepare_run(&ContextRef::new(echo_def(), Value::Null))
            .await
            .unwrap();

        let records = vec![
            Record::ActionCall(ActionCallRecord::with_content("echo", json!(1))),
            Record::ActionCall(ActionCallRecord::with_content("echo", json!(2))),
        ];
        let err = engine.run(records).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::BatchOverflow { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let mut engine = Engine::new(agent());
        engine
            .prepare_run(&ContextRef::new(echo_def(), Value::Null))
            .await
            .unwrap();
        let err = engine
            .post_action_call(ActionCallRecord::with_content("absent", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::UnknownAction { .. })
        ));
    }
}
