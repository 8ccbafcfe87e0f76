//! Value-or-function capability resolvers
//!
//! Context capabilities (inputs, outputs, actions, children, systems) may be
//! declared statically or computed from the current state and agent. A
//! [`Resolver`] is the tagged variant covering both, evaluated through one
//! uniform `resolve` path, with no runtime type inspection.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::agent::Agent;
use crate::context::ContextState;

/// The function form of a resolver.
pub type ResolverFn<T> =
    Arc<dyn Fn(Arc<ContextState>, Arc<Agent>) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// An ordered record of named definitions. Kept as pairs rather than a map
/// so declaration order survives resolution; order is presentation order
/// to the model.
pub type NamedRecord<C> = Vec<(String, C)>;

/// A capability resolver: a fixed value, or a function of the current
/// context state and agent.
#[derive(Clone)]
pub enum Resolver<T> {
    Value(T),
    Fn(ResolverFn<T>),
}

impl<T> Resolver<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A resolver that always yields `value`.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// A resolver computed from the state and agent.
    pub fn with<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ContextState>, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Fn(Arc::new(move |ctx, agent| Box::pin(f(ctx, agent))))
    }

    /// Evaluate against a state/agent pair.
    pub async fn resolve(
        &self,
        ctx: &Arc<ContextState>,
        agent: &Arc<Agent>,
    ) -> anyhow::Result<T> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Fn(f) => f(Arc::clone(ctx), Arc::clone(agent)).await,
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Resolver::Value"),
            Self::Fn(_) => f.write_str("Resolver::Fn"),
        }
    }
}

/// Evaluate an optional resolver, treating absence as an empty default,
/// never an error.
pub async fn resolve_or_default<T>(
    resolver: Option<&Resolver<T>>,
    ctx: &Arc<ContextState>,
    agent: &Arc<Agent>,
) -> anyhow::Result<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    match resolver {
        Some(resolver) => resolver.resolve(ctx, agent).await,
        None => Ok(T::default()),
    }
}

/// Resolve a named record into a list, attaching each entry's name and
/// preserving declaration order.
pub async fn resolve_named_record<C, D, F>(
    resolver: Option<&Resolver<NamedRecord<C>>>,
    ctx: &Arc<ContextState>,
    agent: &Arc<Agent>,
    attach: F,
) -> anyhow::Result<Vec<D>>
where
    C: Clone + Send + Sync + 'static,
    F: Fn(String, C) -> D,
{
    let record = resolve_or_default(resolver, ctx, agent).await?;
    Ok(record
        .into_iter()
        .map(|(name, config)| attach(name, config))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextDef;
    use crate::model::testing::NullModel;
    use serde_json::{json, Value};

    fn fixture() -> (Arc<ContextState>, Arc<Agent>) {
        let def = Arc::new(ContextDef::new("fixture"));
        let state = Arc::new(ContextState::new(def, Value::Null));
        let agent = Agent::new(Arc::new(NullModel)).into_handle();
        (state, agent)
    }

    #[tokio::test]
    async fn static_resolver_yields_value() {
        let (state, agent) = fixture();
        let resolver = Resolver::value(json!([1, 2]));
        assert_eq!(resolver.resolve(&state, &agent).await.unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn dynamic_resolver_sees_state() {
        let (state, agent) = fixture();
        let resolver = Resolver::with(|ctx: Arc<ContextState>, _agent| async move {
            Ok(Value::String(ctx.context.name.clone()))
        });
        assert_eq!(
            resolver.resolve(&state, &agent).await.unwrap(),
            json!("fixture")
        );
    }

    #[tokio::test]
    async fn absent_resolver_defaults_to_empty() {
        let (state, agent) = fixture();
        let resolved: Vec<Value> =
            resolve_or_default(None, &state, &agent).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn named_record_preserves_declaration_order() {
        let (state, agent) = fixture();
        let resolver = Resolver::value(vec![
            ("first".to_string(), json!(1)),
            ("second".to_string(), json!(2)),
        ]);
        let resolved = resolve_named_record(Some(&resolver), &state, &agent, |name, value| {
            (name, value)
        })
        .await
        .unwrap();
        assert_eq!(resolved[0].0, "first");
        assert_eq!(resolved[1].0, "second");
    }

    #[tokio::test]
    async fn dynamic_resolver_failure_propagates() {
        let (state, agent) = fixture();
        let resolver: Resolver<Value> =
            Resolver::with(|_ctx, _agent| async move { anyhow::bail!("no capabilities today") });
        let err = resolver.resolve(&state, &agent).await.unwrap_err();
        assert!(err.to_string().contains("no capabilities"));
    }
}
