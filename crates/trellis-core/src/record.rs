//! Working-memory records
//!
//! The append-ordered log of what happened during a turn: inputs received,
//! action calls and their results, outputs emitted. Records are the core's
//! output surface; the renderer that turns them into model-facing text
//! lives outside this workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An input received by a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRecord {
    pub id: Uuid,
    pub name: String,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

impl InputRecord {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content,
            timestamp: Utc::now(),
            processed: false,
        }
    }
}

/// An output emitted by a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: Uuid,
    pub name: String,
    pub content: Value,
    /// Render-ready form, when the output definition declares a formatter
    pub formatted: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

impl OutputRecord {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content,
            formatted: None,
            timestamp: Utc::now(),
            processed: false,
        }
    }
}

/// A model-selected action call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCallRecord {
    pub id: Uuid,
    pub name: String,
    /// Payload as emitted by the model, before the parse stage
    pub raw: Option<String>,
    /// Parsed arguments; `Null` until parsed, and for schema-less actions
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

impl ActionCallRecord {
    /// A call carrying an unparsed payload.
    pub fn new(name: impl Into<String>, raw: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            raw,
            content: Value::Null,
            timestamp: Utc::now(),
            processed: false,
        }
    }

    /// A call with arguments already parsed (bypasses the parse stage).
    pub fn with_content(name: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            raw: None,
            content,
            timestamp: Utc::now(),
            processed: false,
        }
    }
}

/// The result of an executed action call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResultRecord {
    pub id: Uuid,
    /// Id of the originating call record
    pub call_id: Uuid,
    pub name: String,
    pub data: Value,
    /// True when the value came from the action's recovery handler
    pub recovered: bool,
    /// Render-ready form, when the action declares a formatter
    pub formatted: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActionResultRecord {
    pub fn new(call: &ActionCallRecord, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id: call.id,
            name: call.name.clone(),
            data,
            recovered: false,
            formatted: None,
            timestamp: Utc::now(),
        }
    }

    /// Result produced by the recovery handler instead of the primary one.
    pub fn recovered(call: &ActionCallRecord, data: Value) -> Self {
        Self {
            recovered: true,
            ..Self::new(call, data)
        }
    }

    pub fn with_formatted(mut self, formatted: String) -> Self {
        self.formatted = Some(formatted);
        self
    }
}

/// Any record in a working-memory log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Input(InputRecord),
    Output(OutputRecord),
    ActionCall(ActionCallRecord),
    ActionResult(ActionResultRecord),
}

impl Record {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Input(r) => r.id,
            Self::Output(r) => r.id,
            Self::ActionCall(r) => r.id,
            Self::ActionResult(r) => r.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Input(r) => &r.name,
            Self::Output(r) => &r.name,
            Self::ActionCall(r) => &r.name,
            Self::ActionResult(r) => &r.name,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Input(r) => r.timestamp,
            Self::Output(r) => r.timestamp,
            Self::ActionCall(r) => r.timestamp,
            Self::ActionResult(r) => r.timestamp,
        }
    }
}

/// Append-ordered working memory for one context state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    records: Vec<Record>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Action calls that have not reached a result yet.
    pub fn pending_calls(&self) -> impl Iterator<Item = &ActionCallRecord> {
        let answered: Vec<Uuid> = self
            .records
            .iter()
            .filter_map(|r| match r {
                Record::ActionResult(result) => Some(result.call_id),
                _ => None,
            })
            .collect();
        self.records.iter().filter_map(move |r| match r {
            Record::ActionCall(call) if !answered.contains(&call.id) => Some(call),
            _ => None,
        })
    }

    pub fn action_results(&self) -> impl Iterator<Item = &ActionResultRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::ActionResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Input(input) => Some(input),
            _ => None,
        })
    }
}
