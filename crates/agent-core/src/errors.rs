use action_flow::{ExecutionDump, FlowError};
use action_primitives::ActionError;
use thiserror::Error;

/// Errors emitted by the instruction driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    /// The planner failed or reported an error of its own.
    #[error("planner error: {0}")]
    Planner(String),

    /// The planner kept asking for more rounds.
    #[error(
        "replanned {limit} times without finishing; split the instruction into smaller steps \
         or raise replanning_cycle_limit"
    )]
    ReplanLimitExceeded { limit: u32 },

    #[error("assertion failed: {statement}. {thought}")]
    AssertionFailed { statement: String, thought: String },

    #[error("timed out waiting for: {statement}. {thought}")]
    AssertionTimeout { statement: String, thought: String },

    /// The insight service failed or returned data of the wrong shape.
    #[error("insight error: {0}")]
    Insight(String),

    /// Raised when a request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("execution cancelled")]
    Cancelled,
}

impl From<ActionError> for AgentError {
    fn from(err: ActionError) -> Self {
        AgentError::Flow(err.into())
    }
}

impl AgentError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn planner(message: impl Into<String>) -> Self {
        Self::Planner(message.into())
    }

    pub fn insight(message: impl Into<String>) -> Self {
        Self::Insight(message.into())
    }

    /// Whether running the same call again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Planner(_) | AgentError::Insight(_) => true,
            AgentError::Flow(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn from_flow(err: FlowError) -> Self {
        match err {
            FlowError::Cancelled => AgentError::Cancelled,
            other => AgentError::Flow(other),
        }
    }
}

/// A failed `act`/`run_plans` call together with everything recorded up to
/// the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TaskExecutionError {
    #[source]
    pub error: AgentError,
    pub dump: Box<ExecutionDump>,
}

impl TaskExecutionError {
    pub fn new(error: AgentError, dump: ExecutionDump) -> Self {
        Self {
            error,
            dump: Box::new(dump),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replan_limit_message_suggests_splitting() {
        let message = AgentError::ReplanLimitExceeded { limit: 10 }.to_string();
        assert!(message.contains("10"));
        assert!(message.contains("split the instruction"));
        assert!(!AgentError::ReplanLimitExceeded { limit: 10 }.is_retryable());
    }

    #[test]
    fn flow_cancellation_maps_to_cancelled() {
        assert_eq!(AgentError::from_flow(FlowError::Cancelled), AgentError::Cancelled);
        assert!(matches!(
            AgentError::from(ActionError::UnknownAction("Hover".into())),
            AgentError::Flow(FlowError::UnknownAction(_))
        ));
    }

    #[test]
    fn task_execution_error_keeps_dump() {
        let err = TaskExecutionError::new(
            AgentError::planner("model returned garbage"),
            ExecutionDump::new("Action - open settings"),
        );
        assert_eq!(err.to_string(), "planner error: model returned garbage");
        assert_eq!(err.dump.title, "Action - open settings");
    }
}
