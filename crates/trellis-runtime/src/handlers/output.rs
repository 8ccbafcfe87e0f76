//! Canonical output handlers: resolve, handle

use std::sync::Arc;

use tracing::debug;

use trellis_core::{
    DispatchError, HandleOutputCx, OutputDef, OutputRecord, Record, ResolveOutputCx, Result,
    StageFn,
};

/// Default resolve stage: select the named output from the candidates
/// snapshot, honoring its `enabled` predicate.
pub async fn resolve_output(params: ResolveOutputCx) -> Result<Arc<OutputDef>> {
    let ResolveOutputCx {
        cx,
        record,
        candidates,
    } = params;

    let output = candidates
        .iter()
        .find(|output| output.name == record.name)
        .ok_or_else(|| DispatchError::UnknownOutput {
            name: record.name.clone(),
        })?;

    if let Some(enabled) = &output.enabled {
        if !enabled(&cx.state) {
            return Err(DispatchError::Disabled {
                name: record.name.clone(),
            }
            .into());
        }
    }

    Ok(Arc::clone(output))
}

/// Default handle stage: validate the content, run the output's handler if
/// declared, apply its formatter, mark the record processed, and append it
/// to working memory.
pub async fn handle_output(params: HandleOutputCx) -> Result<OutputRecord> {
    let HandleOutputCx {
        cx,
        output,
        mut record,
    } = params;

    if let Some(schema) = &output.schema {
        schema
            .validate(&record.content)
            .map_err(|err| DispatchError::InvalidArguments {
                name: output.name.clone(),
                reason: err.to_string(),
            })?;
    }

    if let Some(handler) = &output.handler {
        let content = handler(
            record.content.clone(),
            Arc::clone(&cx.state),
            Arc::clone(&cx.agent),
        )
        .await
        .map_err(|source| DispatchError::Handler {
            name: output.name.clone(),
            source,
        })?;
        record.content = content;
    }

    if let Some(format) = &output.format {
        record.formatted = Some(format(&record));
    }

    record.processed = true;
    debug!(output = %output.name, record = %record.id, "output handled");
    cx.state.push_record(Record::Output(record.clone())).await;
    Ok(record)
}

pub fn resolve_output_stage() -> StageFn<ResolveOutputCx, Arc<OutputDef>> {
    Arc::new(|params| Box::pin(resolve_output(params)))
}

pub fn handle_output_stage() -> StageFn<HandleOutputCx, OutputRecord> {
    Arc::new(|params| Box::pin(handle_output(params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModel;
    use serde_json::{json, Value};
    use trellis_core::{Agent, ContextDef, ContextState, OutputConfig, StageCx};

    fn stage_cx() -> StageCx {
        let def = Arc::new(ContextDef::new("voice"));
        StageCx {
            state: Arc::new(ContextState::new(def, Value::Null)),
            agent: Agent::new(Arc::new(MockModel::constant("ok"))).into_handle(),
        }
    }

    #[tokio::test]
    async fn handle_formats_and_records() {
        let cx = stage_cx();
        let output = Arc::new(
            OutputConfig::new()
                .format(|record| format!("say: {}", record.content.as_str().unwrap_or_default()))
                .named("say"),
        );

        let record = handle_output(HandleOutputCx {
            cx: cx.clone(),
            output,
            record: OutputRecord::new("say", json!("good morning")),
        })
        .await
        .unwrap();

        assert!(record.processed);
        assert_eq!(record.formatted.as_deref(), Some("say: good morning"));
        assert_eq!(cx.state.chain().await.len(), 1);
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_output() {
        let err = resolve_output(ResolveOutputCx {
            cx: stage_cx(),
            record: OutputRecord::new("missing", Value::Null),
            candidates: vec![Arc::new(OutputConfig::new().named("say"))],
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
