//! Plan compilation and task execution error types

use action_locator::LocatorError;
use action_primitives::ActionError;
use thiserror::Error;

/// Errors raised while compiling a plan or running its tasks
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// The plan names an action the device does not offer
    #[error("Action type '{0}' not found")]
    UnknownAction(String),

    /// Step parameters failed schema validation
    #[error("Invalid parameters for action '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    /// A required locate field is missing
    #[error("Action '{action}' requires a located element for field '{field}'")]
    MissingLocateField { action: String, field: String },

    /// Element resolution failed
    #[error(transparent)]
    Locate(#[from] LocatorError),

    /// Device action failed
    #[error("Action failed: {0}")]
    Action(ActionError),

    /// The planner emitted an Error step
    #[error("{0}")]
    PlannerReported(String),

    /// The run was cancelled between tasks
    #[error("Execution cancelled")]
    Cancelled,

    /// Malformed plan step
    #[error("Invalid plan step: {0}")]
    InvalidStep(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ActionError> for FlowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::UnknownAction(name) => FlowError::UnknownAction(name),
            ActionError::InvalidParams { action, reason } => {
                FlowError::InvalidParams { action, reason }
            }
            ActionError::MissingLocateField { action, field } => {
                FlowError::MissingLocateField { action, field }
            }
            ActionError::Interrupted(_) => FlowError::Cancelled,
            other => FlowError::Action(other),
        }
    }
}

impl FlowError {
    /// Whether a fresh planning round could get past this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Locate(err) => err.is_retryable(),
            FlowError::Action(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_errors_keep_their_identity() {
        assert_eq!(
            FlowError::from(ActionError::UnknownAction("Hover".into())),
            FlowError::UnknownAction("Hover".into())
        );
        assert!(matches!(
            FlowError::from(ActionError::device("adb offline")),
            FlowError::Action(_)
        ));
        assert_eq!(
            FlowError::from(LocatorError::ElementNotFound("x".into())).to_string(),
            "Element not found: x"
        );
    }
}
