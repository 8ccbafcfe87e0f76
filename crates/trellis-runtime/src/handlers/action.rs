//! Canonical action-call handlers: parse, resolve, prepare, handle

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use trellis_core::{
    Action, ActionCallCx, ActionResultRecord, CallFormat, DispatchError, HandleActionCallCx,
    ParseActionCallCx, PrepareActionCallCx, Record, ResolveActionCallCx, Result, StageFn,
};

use crate::task::{run_action_task, TaskOutcome};

/// Default parse stage: decode the call's raw payload according to the
/// action's call format. A schema-less action accepts no structured
/// arguments; any non-empty payload is a parse error.
pub async fn parse_action_call(params: ParseActionCallCx) -> Result<Value> {
    let ParseActionCallCx { action, call, .. } = params;
    let raw = call.raw.as_deref().unwrap_or("").trim();

    if action.schema.is_none() {
        return if raw.is_empty() {
            Ok(Value::Null)
        } else {
            Err(DispatchError::Parse {
                name: action.name.clone(),
                reason: "action takes no arguments".to_string(),
            }
            .into())
        };
    }

    match action.call_format {
        CallFormat::Json => {
            if raw.is_empty() {
                Ok(Value::Object(serde_json::Map::new()))
            } else {
                serde_json::from_str(raw).map_err(|err| {
                    DispatchError::Parse {
                        name: action.name.clone(),
                        reason: err.to_string(),
                    }
                    .into()
                })
            }
        }
        CallFormat::Text => Ok(Value::String(raw.to_string())),
    }
}

/// Default resolve stage: select the named action from the candidates
/// snapshot, honoring its `enabled` predicate.
pub async fn resolve_action_call(params: ResolveActionCallCx) -> Result<Arc<Action>> {
    let ResolveActionCallCx {
        cx,
        call,
        candidates,
    } = params;

    let action = candidates
        .iter()
        .find(|action| action.name == call.name)
        .ok_or_else(|| DispatchError::UnknownAction {
            name: call.name.clone(),
        })?;

    if let Some(enabled) = &action.enabled {
        if !enabled(&cx.state) {
            return Err(DispatchError::Disabled {
                name: call.name.clone(),
            }
            .into());
        }
    }

    Ok(Arc::clone(action))
}

/// Default prepare stage: validate the parsed arguments against the action
/// schema, record the call in working memory, and build the call context.
pub async fn prepare_action_call(params: PrepareActionCallCx) -> Result<ActionCallCx> {
    let PrepareActionCallCx { cx, action, call } = params;

    if let Some(schema) = &action.schema {
        schema
            .validate(&call.content)
            .map_err(|err| DispatchError::InvalidArguments {
                name: action.name.clone(),
                reason: err.to_string(),
            })?;
    }

    cx.state.push_record(Record::ActionCall(call.clone())).await;
    Ok(ActionCallCx {
        state: Arc::clone(&cx.state),
        call,
    })
}

/// Default handle stage: run the task engine and append the result record.
/// A `Failed` outcome propagates; a `Recovered` one is recorded with its
/// flag set.
pub async fn handle_action_call(params: HandleActionCallCx) -> Result<ActionResultRecord> {
    let HandleActionCallCx {
        cx,
        action,
        call_cx,
    } = params;

    let outcome = run_action_task(call_cx.clone(), Arc::clone(&action), Arc::clone(&cx.agent)).await;
    let record = match outcome {
        TaskOutcome::Succeeded(data) => ActionResultRecord::new(&call_cx.call, data),
        TaskOutcome::Recovered(data) => ActionResultRecord::recovered(&call_cx.call, data),
        TaskOutcome::Failed(error) => return Err(error.into()),
    };

    let record = match &action.format {
        Some(format) => {
            let rendered = format(&record);
            record.with_formatted(rendered)
        }
        None => record,
    };

    debug!(action = %action.name, call = %record.call_id, recovered = record.recovered, "action call handled");
    cx.state
        .push_record(Record::ActionResult(record.clone()))
        .await;
    Ok(record)
}

pub fn parse_action_call_stage() -> StageFn<ParseActionCallCx, Value> {
    Arc::new(|params| Box::pin(parse_action_call(params)))
}

pub fn resolve_action_call_stage() -> StageFn<ResolveActionCallCx, Arc<Action>> {
    Arc::new(|params| Box::pin(resolve_action_call(params)))
}

pub fn prepare_action_call_stage() -> StageFn<PrepareActionCallCx, ActionCallCx> {
    Arc::new(|params| Box::pin(prepare_action_call(params)))
}

pub fn handle_action_call_stage() -> StageFn<HandleActionCallCx, ActionResultRecord> {
    Arc::new(|params| Box::pin(handle_action_call(params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModel;
    use serde_json::json;
    use trellis_core::{
        ActionCallRecord, Agent, ContextDef, ContextState, RuntimeError, Schema, StageCx,
    };

    fn stage_cx() -> StageCx {
        let def = Arc::new(ContextDef::new("bench"));
        StageCx {
            state: Arc::new(ContextState::new(def, Value::Null)),
            agent: Agent::new(Arc::new(MockModel::constant("ok"))).into_handle(),
        }
    }

    fn add_action() -> Arc<Action> {
        Arc::new(
            Action::new("add", |args: Value, _cx, _agent| async move {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                Ok(json!(a + b))
            })
            .schema(Schema::object(
                json!({"a": {"type": "integer"}, "b": {"type": "integer"}}),
                &["a", "b"],
            )),
        )
    }

    #[tokio::test]
    async fn parse_decodes_json_payload() {
        let content = parse_action_call(ParseActionCallCx {
            cx: stage_cx(),
            action: add_action(),
            call: ActionCallRecord::new("add", Some(r#"{"a": 1, "b": 2}"#.to_string())),
        })
        .await
        .unwrap();
        assert_eq!(content, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn parse_rejects_payload_for_schemaless_action() {
        let bare = Arc::new(Action::new("ping", |_args, _cx, _agent| async move {
            Ok(json!("pong"))
        }));
        let err = parse_action_call(ParseActionCallCx {
            cx: stage_cx(),
            action: bare,
            call: ActionCallRecord::new("ping", Some("unexpected".to_string())),
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn parse_empty_payload_for_schemaless_action_is_null() {
        let bare = Arc::new(Action::new("ping", |_args, _cx, _agent| async move {
            Ok(json!("pong"))
        }));
        let content = parse_action_call(ParseActionCallCx {
            cx: stage_cx(),
            action: bare,
            call: ActionCallRecord::new("ping", None),
        })
        .await
        .unwrap();
        assert_eq!(content, Value::Null);
    }

    #[tokio::test]
    async fn parse_text_format_passes_payload_through() {
        let note = Arc::new(
            Action::new("note", |_args, _cx, _agent| async move { Ok(json!(null)) })
                .schema(Schema::new(json!({"type": "string"})))
                .call_format(CallFormat::Text),
        );
        let content = parse_action_call(ParseActionCallCx {
            cx: stage_cx(),
            action: note,
            call: ActionCallRecord::new("note", Some("remember the milk".to_string())),
        })
        .await
        .unwrap();
        assert_eq!(content, json!("remember the milk"));
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_action() {
        let err = resolve_action_call(ResolveActionCallCx {
            cx: stage_cx(),
            call: ActionCallRecord::with_content("vanish", Value::Null),
            candidates: vec![add_action()],
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::UnknownAction { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_honors_enabled_predicate() {
        let gated = Arc::new(
            Action::new("gated", |_args, _cx, _agent| async move { Ok(json!(null)) })
                .enabled(|_state| false),
        );
        let err = resolve_action_call(ResolveActionCallCx {
            cx: stage_cx(),
            call: ActionCallRecord::with_content("gated", Value::Null),
            candidates: vec![gated],
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::Disabled { .. })
        ));
    }

    #[tokio::test]
    async fn prepare_validates_arguments() {
        let err = prepare_action_call(PrepareActionCallCx {
            cx: stage_cx(),
            action: add_action(),
            call: ActionCallRecord::with_content("add", json!({"a": 1})),
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn handle_records_result_in_working_memory() {
        let cx = stage_cx();
        let action = add_action();
        let call = ActionCallRecord::with_content("add", json!({"a": 2, "b": 3}));

        let call_cx = prepare_action_call(PrepareActionCallCx {
            cx: cx.clone(),
            action: Arc::clone(&action),
            call,
        })
        .await
        .unwrap();
        let record = handle_action_call(HandleActionCallCx {
            cx: cx.clone(),
            action,
            call_cx,
        })
        .await
        .unwrap();

        assert_eq!(record.data, json!(5));
        assert!(!record.recovered);
        let chain = cx.state.chain().await;
        assert_eq!(chain.len(), 2);
        assert!(matches!(chain[0], Record::ActionCall(_)));
        assert!(matches!(chain[1], Record::ActionResult(_)));
    }

    #[tokio::test]
    async fn handle_applies_result_formatter() {
        let cx = stage_cx();
        let action = Arc::new(
            Action::new("shout", |_args, _cx, _agent| async move { Ok(json!("hey")) })
                .format(|record| format!("{}!", record.data.as_str().unwrap_or_default())),
        );
        let call_cx = ActionCallCx {
            state: Arc::clone(&cx.state),
            call: ActionCallRecord::with_content("shout", Value::Null),
        };
        let record = handle_action_call(HandleActionCallCx {
            cx,
            action,
            call_cx,
        })
        .await
        .unwrap();
        assert_eq!(record.formatted.as_deref(), Some("hey!"));
    }
}
