//! Core types for task execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tapline_core_types::{HitBy, LocateParams, TaskId};

use crate::errors::FlowError;

/// Where a resolved element is kept until an action consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateTarget {
    /// Produced by a standalone `Locate` step.
    Current,
    /// Produced for a named locate field of the following action.
    Field(String),
}

/// Work item of a compiled plan
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStep {
    Locate {
        params: LocateParams,
        target: LocateTarget,
    },
    Action {
        name: String,
        param: Value,
        /// Locate fields resolved by the tasks queued just before this one.
        locate_fields: Vec<String>,
    },
    Sleep {
        time_ms: u64,
        settle: bool,
    },
    Error {
        thought: String,
    },
    Finished,
}

impl TaskStep {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskStep::Locate { .. } => TaskKind::Locate,
            _ => TaskKind::Action,
        }
    }

    pub fn sub_type(&self) -> &str {
        match self {
            TaskStep::Locate { .. } => crate::plan::LOCATE,
            TaskStep::Action { name, .. } => name,
            TaskStep::Sleep { .. } => crate::plan::SLEEP,
            TaskStep::Error { .. } => crate::plan::ERROR,
            TaskStep::Finished => crate::plan::FINISHED,
        }
    }

    /// Parameters as shown in the execution dump.
    pub fn param(&self) -> Value {
        match self {
            TaskStep::Locate { params, .. } => serde_json::to_value(params).unwrap_or(Value::Null),
            TaskStep::Action { param, .. } => param.clone(),
            TaskStep::Sleep { time_ms, settle } => json!({ "timeMs": time_ms, "settle": settle }),
            TaskStep::Error { thought } => json!({ "thought": thought }),
            TaskStep::Finished => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub id: TaskId,
    pub step: TaskStep,
    pub thought: Option<String>,
    /// Capture a screenshot before running the task.
    pub record_before: bool,
    /// Capture a screenshot after running the task.
    pub record_after: bool,
}

impl QueuedTask {
    pub fn new(step: TaskStep) -> Self {
        Self {
            id: TaskId::new(),
            step,
            thought: None,
            record_before: false,
            record_after: false,
        }
    }

    pub fn with_thought(mut self, thought: Option<String>) -> Self {
        self.thought = thought;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Planning,
    Insight,
    Locate,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderKind {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderItem {
    pub kind: RecorderKind,
    pub timestamp: DateTime<Utc>,
    pub screenshot: String,
}

/// One executed (or skipped) task in the execution dump
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub sub_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub param: Value,
    pub status: TaskStatus,
    pub recorder: Vec<RecorderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_by: Option<HitBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl TaskRecord {
    pub fn new(kind: TaskKind, sub_type: impl Into<String>, param: Value) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            kind,
            sub_type: sub_type.into(),
            thought: None,
            param,
            status: TaskStatus::Running,
            recorder: Vec::new(),
            hit_by: None,
            output: None,
            error: None,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    pub fn from_task(task: &QueuedTask) -> Self {
        let mut record = Self::new(task.step.kind(), task.step.sub_type(), task.step.param());
        record.task_id = task.id.clone();
        record.thought = task.thought.clone();
        record
    }

    pub fn with_thought(mut self, thought: Option<String>) -> Self {
        self.thought = thought;
        self
    }

    pub fn with_output(mut self, output: Option<Value>) -> Self {
        self.output = output;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    /// Set status and finish time, and calculate latency
    pub fn finish(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }
}

/// Ordered record of everything one driver call did
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDump {
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<TaskRecord>,
}

impl ExecutionDump {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            started_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    pub fn push(&mut self, record: TaskRecord) {
        self.tasks.push(record);
    }

    pub fn count(&self, kind: TaskKind) -> usize {
        self.tasks.iter().filter(|task| task.kind == kind).count()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.tasks.iter().map(|task| task.status).collect()
    }
}

/// Result of draining the task queue
#[derive(Debug, Clone)]
pub struct FlushOutcome {
    /// Output of the last finished task.
    pub output: Option<Value>,
    pub status: TaskStatus,
    pub error: Option<FlowError>,
}

impl FlushOutcome {
    pub fn finished(output: Option<Value>) -> Self {
        Self {
            output,
            status: TaskStatus::Finished,
            error: None,
        }
    }

    pub fn failed(error: FlowError) -> Self {
        let status = if error == FlowError::Cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Failed
        };
        Self {
            output: None,
            status,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Option<Value>, FlowError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_task_identity() {
        let task = QueuedTask::new(TaskStep::Sleep {
            time_ms: 100,
            settle: false,
        })
        .with_thought(Some("let the list load".into()));
        let record = TaskRecord::from_task(&task).finish(TaskStatus::Finished);
        assert_eq!(record.task_id, task.id);
        assert_eq!(record.kind, TaskKind::Action);
        assert_eq!(record.sub_type, "Sleep");
        assert_eq!(record.param["timeMs"], 100);
        assert!(record.finished_at >= record.started_at);
    }

    #[test]
    fn dump_serializes_camel_case() {
        let mut dump = ExecutionDump::new("Action - open settings");
        dump.push(
            TaskRecord::new(TaskKind::Planning, "Plan", Value::Null).finish(TaskStatus::Finished),
        );
        let value = serde_json::to_value(&dump).unwrap();
        assert_eq!(value["tasks"][0]["type"], "Planning");
        assert_eq!(value["tasks"][0]["subType"], "Plan");
        assert_eq!(value["tasks"][0]["status"], "finished");
        assert_eq!(dump.count(TaskKind::Planning), 1);
    }

    #[test]
    fn cancelled_flush_reports_cancelled_status() {
        assert_eq!(FlushOutcome::failed(FlowError::Cancelled).status, TaskStatus::Cancelled);
        assert_eq!(
            FlushOutcome::failed(FlowError::PlannerReported("x".into())).status,
            TaskStatus::Failed
        );
    }
}
