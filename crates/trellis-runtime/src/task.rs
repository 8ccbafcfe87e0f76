//! Uniform task execution
//!
//! Every action handler runs under one discipline, no matter what it does
//! internally: exactly one attempt, with the action's declared recovery
//! handler as the only fallback. Retries, if any, belong to a scheduler
//! wrapping tasks, never to this primitive. The engine itself performs no
//! I/O beyond invoking the handlers.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use trellis_core::{Action, ActionCallCx, Agent, TaskError};

/// Lifecycle of one task invocation.
///
/// `Pending -> Running -> {Succeeded | Recovered | Failed}`; the three
/// outcome states are terminal. `Recovered` is reachable only when the
/// primary handler fails and `on_error` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Recovered,
    Failed,
}

/// Terminal result of a task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The primary handler returned a value
    Succeeded(Value),
    /// The primary handler failed; the recovery handler's value stands in
    Recovered(Value),
    /// The primary handler failed and recovery was absent or failed too
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Succeeded(_) => TaskState::Succeeded,
            Self::Recovered(_) => TaskState::Recovered,
            Self::Failed(_) => TaskState::Failed,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }

    /// Collapse into a plain result; recovered values count as success.
    pub fn into_result(self) -> Result<Value, TaskError> {
        match self {
            Self::Succeeded(value) | Self::Recovered(value) => Ok(value),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Execute an action call.
///
/// Invokes `action.handler(call.content, cx, agent)` once. On failure:
/// - with `on_error` declared, the recovery handler runs and its result (or
///   its own failure) becomes the outcome; the original error is not
///   re-raised once recovery has run to completion;
/// - without one, the failure propagates unchanged, identity preserved as
///   the [`TaskError::Action`] source.
pub async fn run_action_task(
    cx: ActionCallCx,
    action: Arc<Action>,
    agent: Arc<Agent>,
) -> TaskOutcome {
    debug!(action = %action.name, call = %cx.call.id, "running action task");

    let args = cx.call.content.clone();
    match (action.handler)(args, cx.clone(), Arc::clone(&agent)).await {
        Ok(value) => {
            debug!(action = %action.name, call = %cx.call.id, "action task succeeded");
            TaskOutcome::Succeeded(value)
        }
        Err(error) => match &action.on_error {
            Some(recover) => {
                warn!(action = %action.name, call = %cx.call.id, %error, "action failed, invoking recovery");
                match recover(error, cx, agent).await {
                    Ok(value) => TaskOutcome::Recovered(value),
                    Err(source) => TaskOutcome::Failed(TaskError::Recovery {
                        action: action.name.clone(),
                        source,
                    }),
                }
            }
            None => {
                warn!(action = %action.name, call = %cx.call.id, %error, "action failed");
                TaskOutcome::Failed(TaskError::Action {
                    action: action.name.clone(),
                    source: error,
                })
            }
        },
    }
}
