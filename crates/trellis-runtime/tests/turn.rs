//! End-to-end turn tests: tree expansion, system overrides along the path,
//! and action execution with recovery.

use std::sync::Arc;

use serde_json::{json, Value};
use trellis_core::{
    Action, ActionCallRecord, Agent, ContextDef, ContextRef, InputConfig, InputRecord, Record,
    Resolver, Schema, System,
};
use trellis_runtime::{Engine, MockModel};

fn agent() -> Arc<Agent> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Agent::new(Arc::new(MockModel::constant("ok"))).into_handle()
}

/// A "chat" context that uses two "thread" children, each with its own
/// actions and inputs.
fn chat_def() -> Arc<ContextDef> {
    let thread = Arc::new(
        ContextDef::new("thread")
            .key(|args| args["id"].as_str().unwrap_or_default().to_string())
            .actions(Resolver::value(vec![Arc::new(
                Action::new("reply", |args, cx: trellis_core::ActionCallCx, _agent| async move {
                    cx.state
                        .memory
                        .update(|memory| {
                            memory["replies"] = json!(
                                memory["replies"].as_i64().unwrap_or_default() + 1
                            );
                        })
                        .await;
                    Ok(json!({"sent": args["text"]}))
                })
                .schema(Schema::object(json!({"text": {"type": "string"}}), &["text"])),
            )])),
    );

    let uses = {
        let thread = Arc::clone(&thread);
        Resolver::with(move |_ctx, _agent| {
            let thread = Arc::clone(&thread);
            async move {
                Ok(vec![
                    ContextRef::new(Arc::clone(&thread), json!({"id": "a"})),
                    ContextRef::new(thread, json!({"id": "b"})),
                ])
            }
        })
    };

    Arc::new(
        ContextDef::new("chat")
            .key(|args| args["userId"].as_str().unwrap_or_default().to_string())
            .inputs(Resolver::value(vec![(
                "message".to_string(),
                InputConfig::new().handler(|content, state, _agent| async move {
                    state
                        .memory
                        .update(|memory| {
                            memory["last"] = content.clone();
                        })
                        .await;
                    Ok(content)
                }),
            )]))
            .uses(uses),
    )
}

#[tokio::test]
async fn prepare_expands_children_in_order() {
    let agent = agent();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(chat_def(), json!({"userId": "u1"})))
        .await
        .unwrap();

    let root = engine.root().unwrap();
    assert_eq!(root.node.ctx.id, "chat:u1");
    let children = root.node.children().await.unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].ctx.key, "a");
    assert_eq!(children[1].ctx.key, "b");
}

#[tokio::test]
async fn action_routes_to_owning_child_state() {
    let agent = agent();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(chat_def(), json!({"userId": "u1"})))
        .await
        .unwrap();

    let result = engine
        .post_action_call(ActionCallRecord::new(
            "reply",
            Some(r#"{"text": "hello"}"#.to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(result.data, json!({"sent": "hello"}));

    // The handler mutated a thread context's memory, not the chat's.
    let thread_state = agent.ctxs.get_by_id("thread:a").await.unwrap();
    assert_eq!(thread_state.memory.read().await["replies"], json!(1));
    let chat_state = agent.ctxs.get_by_id("chat:u1").await.unwrap();
    assert_eq!(chat_state.memory.read().await.get("replies"), None);
}

#[tokio::test]
async fn input_routes_through_handler_into_memory() {
    let agent = agent();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(chat_def(), json!({"userId": "u1"})))
        .await
        .unwrap();

    let record = engine
        .post_input(InputRecord::new("message", json!("how are you")))
        .await
        .unwrap();
    assert!(record.processed);

    let chat_state = agent.ctxs.get_by_id("chat:u1").await.unwrap();
    assert_eq!(chat_state.memory.read().await["last"], json!("how are you"));
}

#[tokio::test]
async fn descendant_system_overrides_agent_level_system() {
    // Both the agent and the child context define a handle_action_call hook;
    // the child's (more specific) must win.
    let marker_system = |label: &'static str| {
        Arc::new(System::new(label).on_handle_action_call(move |params, next| async move {
            let mut record = next(params).await?;
            record.data["handled_by"] = json!(label);
            Ok(record)
        }))
    };

    let child = Arc::new(
        ContextDef::new("worker")
            .actions(Resolver::value(vec![Arc::new(Action::new(
                "work",
                |_args, _cx, _agent| async move { Ok(json!({})) },
            ))]))
            .systems(Resolver::value(vec![marker_system("worker-system")])),
    );
    let uses = {
        let child = Arc::clone(&child);
        Resolver::with(move |_ctx, _agent| {
            let child = Arc::clone(&child);
            async move { Ok(vec![ContextRef::new(child, Value::Null)]) }
        })
    };
    let top = Arc::new(ContextDef::new("top").uses(uses));

    let agent = Agent::new(Arc::new(MockModel::constant("ok")))
        .with_system(marker_system("agent-system"))
        .into_handle();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(top, Value::Null))
        .await
        .unwrap();

    let result = engine
        .post_action_call(ActionCallRecord::with_content("work", Value::Null))
        .await
        .unwrap();
    // Both hooks delegated down the chain; the worker's, being outermost,
    // wrote last on the way back out.
    assert_eq!(result.data["handled_by"], json!("worker-system"));
}

#[tokio::test]
async fn recovered_action_flows_through_the_batch() {
    let flaky = Arc::new(
        ContextDef::new("flaky").actions(Resolver::value(vec![Arc::new(
            Action::new("fetch", |_args, _cx, _agent| async move {
                anyhow::bail!("backend down")
            })
            .on_error(|error, _cx, _agent| async move {
                Ok(json!({"fallback": true, "cause": error.to_string()}))
            }),
        )])),
    );

    let agent = agent();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(flaky, Value::Null))
        .await
        .unwrap();

    let chain = engine
        .run(vec![Record::ActionCall(ActionCallRecord::with_content(
            "fetch",
            Value::Null,
        ))])
        .await
        .unwrap();

    assert_eq!(chain.len(), 1);
    let Record::ActionResult(result) = &chain[0] else {
        panic!("expected an action result");
    };
    assert!(result.recovered);
    assert_eq!(result.data["fallback"], json!(true));
}

#[tokio::test]
async fn failed_action_aborts_the_batch() {
    let doomed = Arc::new(
        ContextDef::new("doomed").actions(Resolver::value(vec![Arc::new(Action::new(
            "explode",
            |_args, _cx, _agent| async move { anyhow::bail!("no recovery here") },
        ))])),
    );

    let agent = agent();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(doomed, Value::Null))
        .await
        .unwrap();

    let err = engine
        .run(vec![Record::ActionCall(ActionCallRecord::with_content(
            "explode",
            Value::Null,
        ))])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("explode"));
}

#[tokio::test]
async fn run_stage_can_be_overridden_by_a_system() {
    // A system that short-circuits the run loop entirely.
    let dry_run = Arc::new(System::new("dry-run").on_run(|params, _next| async move {
        Ok(params.records)
    }));

    let def = Arc::new(ContextDef::new("sandbox"));
    let agent = Agent::new(Arc::new(MockModel::constant("ok")))
        .with_system(dry_run)
        .into_handle();
    let mut engine = Engine::new(Arc::clone(&agent));
    engine
        .prepare_run(&ContextRef::new(def, Value::Null))
        .await
        .unwrap();

    // The batch references an action nobody declares; the override never
    // routes it, so no error surfaces.
    let records = vec![Record::ActionCall(ActionCallRecord::with_content(
        "missing",
        Value::Null,
    ))];
    let chain = engine.run(records.clone()).await.unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].name(), "missing");
}
