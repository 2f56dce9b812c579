use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use action_flow::PlanningAction;
use action_primitives::ActionDescriptor;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tapline_core_types::PageSnapshot;
use task_cache::CacheKind;

use crate::errors::AgentError;

/// Prompting style of a planner. Selects which plan cache record it reads
/// and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerFamily {
    #[default]
    Standard,
    UiTars,
}

impl PlannerFamily {
    pub fn cache_kind(&self) -> CacheKind {
        match self {
            PlannerFamily::Standard => CacheKind::Plan,
            PlannerFamily::UiTars => CacheKind::UiTarsPlan,
        }
    }
}

/// Everything a planner sees for one round.
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub snapshot: &'a PageSnapshot,
    /// Summaries of earlier rounds of the same instruction.
    pub log: &'a str,
    pub action_catalog: &'a [ActionDescriptor],
    pub action_context: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanResponse {
    pub actions: Vec<PlanningAction>,
    pub more_actions_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl PlanResponse {
    /// Final round.
    pub fn done(actions: Vec<PlanningAction>) -> Self {
        Self {
            actions,
            ..Default::default()
        }
    }

    /// Round after which the planner wants to look at the page again.
    pub fn more(actions: Vec<PlanningAction>) -> Self {
        Self {
            actions,
            more_actions_needed: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }
}

/// Abstraction over model-backed planners.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        instruction: &str,
        context: &PlanningContext<'_>,
    ) -> Result<PlanResponse, AgentError>;

    fn family(&self) -> PlannerFamily {
        PlannerFamily::Standard
    }
}

/// What a [`ScriptedPlanner`] was asked, for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub instruction: String,
    pub log: String,
    pub action_context: Option<String>,
    pub catalog: Vec<String>,
}

/// Deterministic planner used for tests and offline development: answers
/// from a queue, then repeats its fallback response if one is set.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    responses: Mutex<VecDeque<PlanResponse>>,
    repeat: Option<PlanResponse>,
    family: PlannerFamily,
    requests: Mutex<Vec<PlanRequest>>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn new(responses: impl IntoIterator<Item = PlanResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Always answers with `response`.
    pub fn repeating(response: PlanResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Default::default()
        }
    }

    pub fn with_family(mut self, family: PlannerFamily) -> Self {
        self.family = family;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        instruction: &str,
        context: &PlanningContext<'_>,
    ) -> Result<PlanResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(PlanRequest {
            instruction: instruction.to_string(),
            log: context.log.to_string(),
            action_context: context.action_context.map(str::to_string),
            catalog: context
                .action_catalog
                .iter()
                .map(|action| action.name.clone())
                .collect(),
        });
        if let Some(response) = self.responses.lock().pop_front() {
            return Ok(response);
        }
        self.repeat
            .clone()
            .ok_or_else(|| AgentError::planner("scripted planner has no responses left"))
    }

    fn family(&self) -> PlannerFamily {
        self.family
    }
}

/// Planner backed by a closure over the instruction and round context.
pub struct FnPlanner<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnPlanner<F>
where
    F: Fn(&str, &PlanningContext<'_>) -> PlanResponse + Send + Sync,
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
impl<F> Planner for FnPlanner<F>
where
    F: Fn(&str, &PlanningContext<'_>) -> PlanResponse + Send + Sync,
{
    async fn plan(
        &self,
        instruction: &str,
        context: &PlanningContext<'_>,
    ) -> Result<PlanResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.f)(instruction, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tapline_core_types::{ElementTree, Size};

    fn snapshot() -> PageSnapshot {
        PageSnapshot::new("data:", ElementTree::default(), Size::new(800, 600))
    }

    #[tokio::test]
    async fn scripted_planner_drains_then_fails() {
        let planner = ScriptedPlanner::new([PlanResponse::done(vec![PlanningAction::finished()])]);
        let snapshot = snapshot();
        let context = PlanningContext {
            snapshot: &snapshot,
            log: "",
            action_catalog: &[],
            action_context: Some("prefer keyboard"),
        };
        assert!(planner.plan("close dialog", &context).await.is_ok());
        assert!(matches!(
            planner.plan("close dialog", &context).await,
            Err(AgentError::Planner(_))
        ));
        assert_eq!(planner.calls(), 2);
        assert_eq!(
            planner.requests()[0].action_context.as_deref(),
            Some("prefer keyboard")
        );
    }

    #[test]
    fn response_wire_format() {
        let response: PlanResponse = serde_json::from_value(json!({
            "actions": [{"type": "Tap", "locate": {"prompt": "ok"}}],
            "moreActionsNeeded": true,
            "log": "tapped ok"
        }))
        .unwrap();
        assert!(response.more_actions_needed);
        assert_eq!(response.actions[0].action_type, "Tap");
        assert_eq!(PlannerFamily::UiTars.cache_kind(), CacheKind::UiTarsPlan);
    }
}
