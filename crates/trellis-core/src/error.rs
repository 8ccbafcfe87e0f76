//! Error types for the context runtime
//!
//! One enum per concern, the way the rest of the workspace splits them:
//! [`ContextError`] for resolution and store lookups, [`DispatchError`] for
//! routing a record through the stage pipeline, [`TaskError`] for action
//! execution. [`RuntimeError`] is the umbrella carried by stage handlers.
//!
//! User-supplied handlers and resolvers fail with `anyhow::Error`; those
//! errors are kept as sources so callers can downcast to the original type.

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures while resolving context capabilities or looking up state.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A capability resolver (`inputs`, `outputs`, `actions`, `uses`,
    /// `systems`) threw. The affected node keeps its prior state.
    #[error("resolver '{what}' for context '{context}' failed: {source}")]
    Resolver {
        /// Which resolver failed
        what: &'static str,
        /// Name of the context definition
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Instantiation arguments rejected by the context schema
    #[error("invalid arguments for context '{context}': {reason}")]
    InvalidArgs {
        /// Name of the context definition
        context: String,
        /// Why validation failed
        reason: String,
    },

    /// Tree expansion hit the configured depth limit
    #[error("context tree exceeds maximum depth {max_depth} at '{context}'")]
    DepthExceeded {
        /// Context at which the limit was hit
        context: String,
        /// Configured limit
        max_depth: usize,
    },
}

impl ContextError {
    /// Wrap a resolver failure with its location.
    pub fn resolver(
        what: &'static str,
        context: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Resolver {
            what,
            context: context.into(),
            source,
        }
    }
}

/// Failures while routing a record through the stage pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No action with this name in the resolved tree
    #[error("action '{name}' is not available in this context tree")]
    UnknownAction { name: String },

    /// No input with this name in the resolved tree
    #[error("input '{name}' is not available in this context tree")]
    UnknownInput { name: String },

    /// No output with this name in the resolved tree
    #[error("output '{name}' is not available in this context tree")]
    UnknownOutput { name: String },

    /// The definition exists but its `enabled` predicate rejected the state
    #[error("'{name}' is disabled in the current context state")]
    Disabled { name: String },

    /// Call payload could not be decoded
    #[error("failed to parse call payload for '{name}': {reason}")]
    Parse { name: String, reason: String },

    /// Parsed content rejected by the definition's schema
    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    /// An input/output handler failed
    #[error("handler for '{name}' failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// `run` was called before `prepare_run` built a tree for the turn
    #[error("turn is not prepared: call prepare_run first")]
    NotPrepared,

    /// A run batch was larger than the configured limit
    #[error("run batch exceeds configured limit of {limit} records")]
    BatchOverflow { limit: usize },
}

/// Failures of a task execution.
///
/// `Action` preserves the handler's original error as its source, so the
/// caller can still downcast it. `Recovery` supersedes the original error:
/// once a recovery handler has run, the primary failure is not resurfaced.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The action handler failed and no recovery handler was declared
    #[error("action '{action}' failed: {source}")]
    Action {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    /// The action's `on_error` handler itself failed
    #[error("recovery for action '{action}' failed: {source}")]
    Recovery {
        action: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TaskError {
    /// The underlying handler error.
    pub fn source_error(&self) -> &anyhow::Error {
        match self {
            Self::Action { source, .. } | Self::Recovery { source, .. } => source,
        }
    }
}

/// Umbrella error carried by stage handlers and the turn engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Model(#[from] crate::model::ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_preserves_source_identity() {
        #[derive(Debug, Error)]
        #[error("boom")]
        struct Boom;

        let err = TaskError::Action {
            action: "explode".into(),
            source: anyhow::Error::new(Boom),
        };
        assert!(err.source_error().downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn umbrella_wraps_transparently() {
        let err: RuntimeError = DispatchError::UnknownAction {
            name: "missing".into(),
        }
        .into();
        assert!(err.to_string().contains("missing"));
    }
}
