//! Run-history document schema.
//!
//! The run history is an externally-defined, read-only input produced by the
//! workflow emulator for one completed run: a tree of sequential scopes and
//! repeatable (loop) scopes containing action executions, each with a status
//! and optional input/output payloads. Nothing here is owned by this crate;
//! the types only mirror the emulator's JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Terminated,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Status of one action execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    NotRun,
    Succeeded,
    Failed,
    Skipped,
    Aborted,
    TimedOut,
}

/// The trigger invocation that started the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    pub name: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One action execution as reported by the emulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub name: String,
    pub status: ActionStatus,
    /// Absent when the action never ran or the runtime recorded no input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// Absent for failed executions that terminated without producing output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// A sequential container of child nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRecord {
    pub name: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub children: Vec<ScopeNode>,
}

/// A repeatable container: the loop body ran once per iteration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRecord {
    pub name: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub iterations: Vec<LoopIteration>,
}

/// One iteration of a loop body, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopIteration {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub children: Vec<ScopeNode>,
}

/// A node in the run-history tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScopeNode {
    Action(ActionRecord),
    Scope(ScopeRecord),
    Loop(LoopRecord),
}

/// The full run-history document for one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistory {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerRecord>,
    #[serde(default)]
    pub actions: Vec<ScopeNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}
