//! Error types for device actions

use thiserror::Error;

/// Errors raised while dispatching or executing a device action
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// The action name is not registered in the device's action space
    #[error("Action type '{0}' not found")]
    UnknownAction(String),

    /// Parameters failed schema validation
    #[error("Invalid parameters for action '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    /// A required locate field was not supplied or not resolved
    #[error("Action '{action}' requires a located element for field '{field}'")]
    MissingLocateField { action: String, field: String },

    /// The device backend failed
    #[error("Device error: {0}")]
    Device(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn invalid_params(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_locate(action: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingLocateField {
            action: action.into(),
            field: field.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    /// Device actions are never retried by the engine; only the device
    /// itself may report a transient failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Device(_))
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) => 3,
            ActionError::Device(_) => 2,
            ActionError::UnknownAction(_)
            | ActionError::InvalidParams { .. }
            | ActionError::MissingLocateField { .. } => 1,
            ActionError::Interrupted(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_message_names_the_action() {
        let err = ActionError::UnknownAction("Hover".into());
        assert_eq!(err.to_string(), "Action type 'Hover' not found");
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), 1);
    }
}
