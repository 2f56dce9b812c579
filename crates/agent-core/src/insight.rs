use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tapline_core_types::PageSnapshot;

use crate::errors::AgentError;

/// Key under which assertions ask for their verdict.
pub const STATEMENT_KEY: &str = "StatementIsTruthy";

/// Key used by the typed query helpers.
pub const RESULT_KEY: &str = "result";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

/// Data extraction from a page snapshot, usually a vision model.
#[async_trait]
pub trait Insight: Send + Sync {
    async fn extract(
        &self,
        demand: &Value,
        snapshot: &PageSnapshot,
    ) -> Result<ExtractResult, AgentError>;
}

/// `{"result": "<Type>, <prompt>"}`
pub fn typed_demand(type_name: &str, prompt: &str) -> Value {
    json!({ RESULT_KEY: format!("{type_name}, {prompt}") })
}

pub fn assertion_demand(statement: &str) -> Value {
    json!({
        STATEMENT_KEY: format!("Boolean, whether the following statement is true: {statement}")
    })
}

/// Reads a boolean the way models tend to answer: `true`, `"true"`, `"yes"`.
pub fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

/// Insight backed by a closure, used for tests and scripted scenarios.
pub struct FnInsight<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnInsight<F>
where
    F: Fn(&Value, &PageSnapshot) -> Result<ExtractResult, AgentError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> Insight for FnInsight<F>
where
    F: Fn(&Value, &PageSnapshot) -> Result<ExtractResult, AgentError> + Send + Sync,
{
    async fn extract(
        &self,
        demand: &Value,
        snapshot: &PageSnapshot,
    ) -> Result<ExtractResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(demand, snapshot)
    }
}

/// Insight for drivers that never query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInsight;

#[async_trait]
impl Insight for NoInsight {
    async fn extract(
        &self,
        _demand: &Value,
        _snapshot: &PageSnapshot,
    ) -> Result<ExtractResult, AgentError> {
        Err(AgentError::insight("no insight service configured"))
    }
}
