//! Planner wire format and its classification into plan steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tapline_core_types::LocateParams;

pub const LOCATE: &str = "Locate";
pub const SLEEP: &str = "Sleep";
pub const ERROR: &str = "Error";
pub const FINISHED: &str = "Finished";

/// Used when a Sleep step carries no duration.
pub const DEFAULT_SLEEP_MS: u64 = 3000;

/// One action as emitted by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub param: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locate: Option<LocateParams>,
}

impl PlanningAction {
    pub fn new(action_type: impl Into<String>, param: Value) -> Self {
        Self {
            action_type: action_type.into(),
            param,
            thought: None,
            locate: None,
        }
    }

    pub fn locate(params: LocateParams) -> Self {
        Self {
            locate: Some(params),
            ..Self::new(LOCATE, Value::Null)
        }
    }

    pub fn sleep(time_ms: u64) -> Self {
        Self::new(SLEEP, serde_json::json!({ "timeMs": time_ms }))
    }

    pub fn error(thought: impl Into<String>) -> Self {
        Self {
            thought: Some(thought.into()),
            ..Self::new(ERROR, Value::Null)
        }
    }

    pub fn finished() -> Self {
        Self::new(FINISHED, Value::Null)
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    pub fn with_locate(mut self, params: LocateParams) -> Self {
        self.locate = Some(params);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepParams {
    pub time_ms: Option<u64>,
    /// `time_ms` is a settle time measured from the end of the last action.
    #[serde(default)]
    pub settle: bool,
}

/// A planning action sorted by what the compiler has to do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// `None` when the planner signalled there is nothing to locate.
    Locate(Option<LocateParams>),
    Sleep { time_ms: u64, settle: bool },
    Error { thought: String },
    Finished,
    Action { name: String, param: Value },
}

impl PlanStep {
    pub fn classify(action: &PlanningAction) -> PlanStep {
        Self::classify_with(action, DEFAULT_SLEEP_MS)
    }

    /// Like [`PlanStep::classify`] with a caller-chosen Sleep default.
    pub fn classify_with(action: &PlanningAction, default_sleep_ms: u64) -> PlanStep {
        match action.action_type.as_str() {
            LOCATE => {
                let params = action
                    .locate
                    .clone()
                    .or_else(|| LocateParams::from_value(&action.param))
                    .filter(|params| !params.is_null_target());
                PlanStep::Locate(params)
            }
            SLEEP => {
                let params: SleepParams =
                    serde_json::from_value(action.param.clone()).unwrap_or_default();
                PlanStep::Sleep {
                    time_ms: params.time_ms.unwrap_or(default_sleep_ms),
                    settle: params.settle,
                }
            }
            ERROR => PlanStep::Error {
                thought: action
                    .param
                    .get("thought")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| action.thought.clone())
                    .unwrap_or_else(|| "planner reported an error".to_string()),
            },
            FINISHED => PlanStep::Finished,
            name => PlanStep::Action {
                name: name.to_string(),
                param: action.param.clone(),
            },
        }
    }
}
