//! Effective-handler dispatch over resolved systems
//!
//! For each processing stage there is one canonical default plus zero or
//! more overrides contributed by the systems along the path from the active
//! node up to the root. Dispatch builds an explicit ordered chain, most
//! specific first, and folds it over the default: each defined hook wraps
//! the next-more-general handler, undefined hooks are transparent.
//!
//! The fold is pure. Given the same node path and system lists it always
//! yields the same effective handler; nothing can register itself at call
//! time.

use std::sync::Arc;

use trellis_core::{StageFn, StageHook, System, SystemHooks};

use crate::tree::ContextTreeNode;

/// Ordered chain of systems for one node, most specific first.
#[derive(Clone)]
pub struct SystemChain {
    systems: Vec<Arc<System>>,
}

impl SystemChain {
    /// Chain for a node: its own systems (later declarations first), then
    /// each ancestor's, then the root's.
    pub fn for_node(node: &Arc<ContextTreeNode>) -> Self {
        Self {
            systems: node.system_path(),
        }
    }

    /// Chain from an explicit list, most specific first.
    pub fn from_systems(systems: Vec<Arc<System>>) -> Self {
        Self { systems }
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Names along the chain, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// The effective handler for one stage.
    ///
    /// Folds from the most general override down to the most specific, so
    /// the most specific hook runs first and receives the rest of the chain
    /// (ending in `default`) as its `next`.
    pub fn effective<P, R>(
        &self,
        pick: impl Fn(&SystemHooks) -> Option<StageHook<P, R>>,
        default: StageFn<P, R>,
    ) -> StageFn<P, R>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        let mut handler = default;
        for system in self.systems.iter().rev() {
            if let Some(hook) = pick(&system.hooks) {
                let next = handler;
                handler = Arc::new(move |params| hook(params, Arc::clone(&next)));
            }
        }
        handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use trellis_core::{
        Agent, ContextDef, ContextState, HandleInputCx, InputConfig, InputRecord, StageCx, System,
    };

    use crate::mock::MockModel;

    fn stage_cx() -> StageCx {
        let def = Arc::new(ContextDef::new("probe"));
        StageCx {
            state: Arc::new(ContextState::new(def, Value::Null)),
            agent: Agent::new(Arc::new(MockModel::constant("ok"))).into_handle(),
        }
    }

    fn tag_default(tag: &'static str) -> StageFn<HandleInputCx, InputRecord> {
        Arc::new(move |params: HandleInputCx| {
            Box::pin(async move {
                let mut record = params.record;
                record.content = json!([tag]);
                Ok(record)
            })
        })
    }

    fn tagging_system(name: &'static str) -> Arc<System> {
        Arc::new(System::new(name).on_handle_input(move |params, next| async move {
            let mut record = next(params).await?;
            record
                .content
                .as_array_mut()
                .unwrap()
                .push(json!(name));
            Ok(record)
        }))
    }

    fn input_params(cx: StageCx) -> HandleInputCx {
        HandleInputCx {
            cx,
            input: Arc::new(InputConfig::new().named("probe")),
            record: InputRecord::new("probe", Value::Null),
        }
    }

    #[tokio::test]
    async fn default_runs_when_chain_is_empty() {
        let chain = SystemChain::from_systems(Vec::new());
        let handler = chain.effective(|hooks| hooks.handle_input.clone(), tag_default("base"));
        let record = handler(input_params(stage_cx())).await.unwrap();
        assert_eq!(record.content, json!(["base"]));
    }

    #[tokio::test]
    async fn most_specific_hook_runs_first() {
        // "deep" is more specific than "shallow"; both delegate to next, so
        // the default's tag lands first and wrappers append on the way out:
        // deep sees the chain [shallow -> base] as its next.
        let chain = SystemChain::from_systems(vec![
            tagging_system("deep"),
            tagging_system("shallow"),
        ]);
        let handler = chain.effective(|hooks| hooks.handle_input.clone(), tag_default("base"));
        let record = handler(input_params(stage_cx())).await.unwrap();
        assert_eq!(record.content, json!(["base", "shallow", "deep"]));
    }

    #[tokio::test]
    async fn specific_hook_can_replace_without_delegating() {
        let replace = Arc::new(System::new("replace").on_handle_input(
            |params: HandleInputCx, _next| async move {
                let mut record = params.record;
                record.content = json!("replaced");
                Ok(record)
            },
        ));
        let chain = SystemChain::from_systems(vec![replace, tagging_system("ignored")]);
        let handler = chain.effective(|hooks| hooks.handle_input.clone(), tag_default("base"));
        let record = handler(input_params(stage_cx())).await.unwrap();
        // Neither the general system nor the default ran.
        assert_eq!(record.content, json!("replaced"));
    }

    #[tokio::test]
    async fn undefined_stage_falls_through() {
        let unrelated = Arc::new(
            System::new("unrelated").on_handle_output(|params, next| next(params)),
        );
        let chain = SystemChain::from_systems(vec![unrelated]);
        let handler = chain.effective(|hooks| hooks.handle_input.clone(), tag_default("base"));
        let record = handler(input_params(stage_cx())).await.unwrap();
        assert_eq!(record.content, json!(["base"]));
    }
}
