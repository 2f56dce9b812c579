//! Error types for the locate resolver

use action_primitives::ActionError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocatorError {
    /// No tier produced an element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The locate request carries nothing to resolve
    #[error("Invalid locate request: {0}")]
    InvalidRequest(String),

    /// The AI locate service failed
    #[error("AI locate failed: {0}")]
    AiService(String),

    /// Device call failed while resolving
    #[error("Device error during locate: {0}")]
    Device(#[from] ActionError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Retrying belongs to the replanning loop; this only reports whether a
    /// fresh round could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::ElementNotFound(_) | LocatorError::AiService(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) => 3,
            LocatorError::AiService(_) | LocatorError::Device(_) => 2,
            LocatorError::ElementNotFound(_) => 1,
            LocatorError::InvalidRequest(_) => 0,
        }
    }
}
