//! Context tree construction and lazy resolution
//!
//! Each turn builds a tree of active contexts: the entry context at the top,
//! plus the child contexts it (transitively) declares through `uses`. The
//! tree is the single source of truth for what can happen at this point in
//! the conversation, and it is rebuilt per turn; nothing is cached across
//! turns.
//!
//! Resolution is split into two independent lazy phases so callers pay only
//! for what they need: `resolve_node_children` expands tree shape,
//! `resolve_node_components` expands a node's capability surface. A node
//! with unresolved children is distinct from a node known to have zero
//! children.

use std::sync::{Arc, Weak};

use futures::future::{try_join_all, BoxFuture};
use tokio::sync::RwLock;
use tracing::debug;

use trellis_core::{
    resolve_named_record, resolve_or_default, Action, Agent, ContextError, ContextRef,
    ContextState, InputConfig, InputDef, OutputConfig, OutputDef, Result, RuntimeError, System,
};

/// A lazily-resolved node field. `Unresolved` is distinct from
/// resolved-but-empty.
#[derive(Debug, Clone, Default)]
pub enum Lazy<T> {
    #[default]
    Unresolved,
    Resolved(T),
}

impl<T: Clone> Lazy<T> {
    pub fn get(&self) -> Option<T> {
        match self {
            Self::Unresolved => None,
            Self::Resolved(value) => Some(value.clone()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Capability surface of one node. The three collections are assembled
/// atomically: a reader never observes only some of them populated.
#[derive(Debug, Clone, Default)]
pub struct NodeComponents {
    pub inputs: Vec<Arc<InputDef>>,
    pub outputs: Vec<Arc<OutputDef>>,
    pub actions: Vec<Arc<Action>>,
}

/// Parent edge of a node. The root edge carries the agent-level systems so
/// dispatch can reach them without a back-pointer to the root value.
#[derive(Clone)]
pub enum NodeParent {
    Root { systems: Vec<Arc<System>> },
    Node(Weak<ContextTreeNode>),
}

/// One node of the context tree.
///
/// `parent` and `systems` are fixed at construction; `components` and
/// `children` are filled in by their resolve operations. Each node
/// exclusively owns its lazy storage.
pub struct ContextTreeNode {
    pub ctx: Arc<ContextState>,
    parent: NodeParent,
    /// Systems resolved from this node's own definition only; propagation
    /// along the tree is dispatch's concern.
    pub systems: Vec<Arc<System>>,
    components: RwLock<Lazy<NodeComponents>>,
    children: RwLock<Lazy<Vec<Arc<ContextTreeNode>>>>,
}

impl std::fmt::Debug for ContextTreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextTreeNode")
            .field("ctx", &self.ctx.id)
            .field("systems", &self.systems.len())
            .finish_non_exhaustive()
    }
}

impl ContextTreeNode {
    /// Resolved capability surface, `None` until resolved.
    pub async fn components(&self) -> Option<NodeComponents> {
        self.components.read().await.get()
    }

    /// Resolved children, `None` until resolved.
    pub async fn children(&self) -> Option<Vec<Arc<ContextTreeNode>>> {
        self.children.read().await.get()
    }

    /// Parent node, `None` for the node directly under the root.
    pub fn parent(&self) -> Option<Arc<ContextTreeNode>> {
        match &self.parent {
            NodeParent::Root { .. } => None,
            NodeParent::Node(weak) => weak.upgrade(),
        }
    }

    /// Systems in effect at this node, most specific first: own systems in
    /// reverse declaration order (later declarations override earlier
    /// ones), then each ancestor's, then the root's.
    pub fn system_path(&self) -> Vec<Arc<System>> {
        let mut path: Vec<Arc<System>> = self.systems.iter().rev().cloned().collect();
        let mut parent = self.parent.clone();
        loop {
            match parent {
                NodeParent::Root { systems } => {
                    path.extend(systems.iter().rev().cloned());
                    break;
                }
                NodeParent::Node(weak) => match weak.upgrade() {
                    Some(node) => {
                        path.extend(node.systems.iter().rev().cloned());
                        parent = node.parent.clone();
                    }
                    None => break,
                },
            }
        }
        path
    }
}

/// Entry point of a turn's tree: the globally-resolved systems and the
/// single node for the entry context.
pub struct ContextTreeRoot {
    pub systems: Vec<Arc<System>>,
    pub node: Arc<ContextTreeNode>,
}

/// Build the root for a turn.
pub async fn create_context_tree_root(
    ctx: Arc<ContextState>,
    agent: &Arc<Agent>,
    systems: Vec<Arc<System>>,
) -> Result<ContextTreeRoot> {
    let node = create_context_node(
        ctx,
        agent,
        NodeParent::Root {
            systems: systems.clone(),
        },
    )
    .await?;
    Ok(ContextTreeRoot { systems, node })
}

/// Build a single node. Resolves only the node's own `systems` (defaulting
/// to none); children and components stay unresolved, so construction cost
/// does not grow with tree depth.
pub async fn create_context_node(
    ctx: Arc<ContextState>,
    agent: &Arc<Agent>,
    parent: NodeParent,
) -> Result<Arc<ContextTreeNode>> {
    let systems = resolve_or_default(ctx.context.systems.as_ref(), &ctx, agent)
        .await
        .map_err(|source| ContextError::resolver("systems", &ctx.context.name, source))?;

    Ok(Arc::new(ContextTreeNode {
        ctx,
        parent,
        systems,
        components: RwLock::new(Lazy::Unresolved),
        children: RwLock::new(Lazy::Unresolved),
    }))
}

/// Resolve the node's children from its `uses` declaration.
///
/// Each reference is looked up through the agent's context store (creating
/// state on first use) and becomes one child node with `parent` pointing
/// back here. Children are built concurrently and attached as a single
/// wholesale replacement: no partial list is ever visible, and calling
/// this twice does not merge. On any failure the previous children (or
/// their unresolved state) are kept and the error propagates.
pub async fn resolve_node_children(
    node: &Arc<ContextTreeNode>,
    agent: &Arc<Agent>,
) -> Result<Arc<ContextTreeNode>> {
    let refs: Vec<ContextRef> = resolve_or_default(node.ctx.context.uses.as_ref(), &node.ctx, agent)
        .await
        .map_err(|source| ContextError::resolver("uses", &node.ctx.context.name, source))?;

    let children = try_join_all(refs.into_iter().map(|reference| {
        let agent = Arc::clone(agent);
        let parent = Arc::downgrade(node);
        async move {
            let ctx = agent.ctxs.get(&reference).await?;
            create_context_node(ctx, &agent, NodeParent::Node(parent)).await
        }
    }))
    .await?;

    debug!(context = %node.ctx.id, children = children.len(), "resolved node children");
    *node.children.write().await = Lazy::Resolved(children);
    Ok(Arc::clone(node))
}

/// Resolve the node's capability surface.
///
/// `inputs` and `outputs` go through the named-record resolver (attaching
/// names, preserving declaration order), `actions` through the plain list
/// resolver; absence of any resolver means an empty collection. The three
/// are gathered first and written in one step; on failure the previous
/// state is kept and the error propagates. Independent from children
/// resolution.
pub async fn resolve_node_components(
    node: &Arc<ContextTreeNode>,
    agent: &Arc<Agent>,
) -> Result<Arc<ContextTreeNode>> {
    let ctx = &node.ctx;
    let def = &ctx.context;
    let context_name = def.name.clone();

    let inputs = async {
        resolve_named_record(def.inputs.as_ref(), ctx, agent, |name, config: InputConfig| {
            Arc::new(config.named(name))
        })
        .await
        .map_err(|source| RuntimeError::from(ContextError::resolver("inputs", &context_name, source)))
    };
    let outputs = async {
        resolve_named_record(def.outputs.as_ref(), ctx, agent, |name, config: OutputConfig| {
            Arc::new(config.named(name))
        })
        .await
        .map_err(|source| RuntimeError::from(ContextError::resolver("outputs", &context_name, source)))
    };
    let actions = async {
        resolve_or_default(def.actions.as_ref(), ctx, agent)
            .await
            .map_err(|source| RuntimeError::from(ContextError::resolver("actions", &context_name, source)))
    };

    let (inputs, outputs, actions): (Vec<Arc<InputDef>>, Vec<Arc<OutputDef>>, Vec<Arc<Action>>) =
        futures::try_join!(inputs, outputs, actions)?;

    *node.components.write().await = Lazy::Resolved(NodeComponents {
        inputs,
        outputs,
        actions,
    });
    Ok(Arc::clone(node))
}

/// Fully expand a subtree: components and children for this node, then every
/// child, siblings concurrently. The depth guard stops runaway `uses`
/// recursion.
pub fn resolve_tree<'a>(
    node: &'a Arc<ContextTreeNode>,
    agent: &'a Arc<Agent>,
    max_depth: usize,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if max_depth == 0 {
            return Err(ContextError::DepthExceeded {
                context: node.ctx.context.name.clone(),
                max_depth,
            }
            .into());
        }

        resolve_node_components(node, agent).await?;
        resolve_node_children(node, agent).await?;

        let children = node.children().await.unwrap_or_default();
        try_join_all(
            children
                .iter()
                .map(|child| resolve_tree(child, agent, max_depth - 1)),
        )
        .await?;
        Ok(())
    })
}
