//! Canonical input handlers: resolve, handle

use std::sync::Arc;

use tracing::debug;

use trellis_core::{
    DispatchError, HandleInputCx, InputDef, InputRecord, Record, ResolveInputCx, Result, StageFn,
};

/// Default resolve stage: select the named input from the candidates
/// snapshot, honoring its `enabled` predicate.
pub async fn resolve_input(params: ResolveInputCx) -> Result<Arc<InputDef>> {
    let ResolveInputCx {
        cx,
        record,
        candidates,
    } = params;

    let input = candidates
        .iter()
        .find(|input| input.name == record.name)
        .ok_or_else(|| DispatchError::UnknownInput {
            name: record.name.clone(),
        })?;

    if let Some(enabled) = &input.enabled {
        if !enabled(&cx.state) {
            return Err(DispatchError::Disabled {
                name: record.name.clone(),
            }
            .into());
        }
    }

    Ok(Arc::clone(input))
}

/// Default handle stage: validate the content, run the input's handler if it
/// declares one (its result becomes the record content), mark the record
/// processed, and append it to working memory.
pub async fn handle_input(params: HandleInputCx) -> Result<InputRecord> {
    let HandleInputCx {
        cx,
        input,
        mut record,
    } = params;

    if let Some(schema) = &input.schema {
        schema
            .validate(&record.content)
            .map_err(|err| DispatchError::InvalidArguments {
                name: input.name.clone(),
                reason: err.to_string(),
            })?;
    }

    if let Some(handler) = &input.handler {
        let content = handler(
            record.content.clone(),
            Arc::clone(&cx.state),
            Arc::clone(&cx.agent),
        )
        .await
        .map_err(|source| DispatchError::Handler {
            name: input.name.clone(),
            source,
        })?;
        record.content = content;
    }

    record.processed = true;
    debug!(input = %input.name, record = %record.id, "input handled");
    cx.state.push_record(Record::Input(record.clone())).await;
    Ok(record)
}

pub fn resolve_input_stage() -> StageFn<ResolveInputCx, Arc<InputDef>> {
    Arc::new(|params| Box::pin(resolve_input(params)))
}

pub fn handle_input_stage() -> StageFn<HandleInputCx, InputRecord> {
    Arc::new(|params| Box::pin(handle_input(params)))
}
