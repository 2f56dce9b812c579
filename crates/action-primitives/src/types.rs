//! Core data types for action dispatch

use std::collections::BTreeMap;

use tapline_core_types::{ResolvedElement, RunId};
use tokio_util::sync::CancellationToken;

/// Execution context shared by every action in one run
///
/// - Run id correlating dumps and logs
/// - Cancellation token checked between steps
/// - Unique action ID for tracing and correlation
#[derive(Clone, Debug)]
pub struct ExecCtx {
    pub run_id: RunId,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    pub fn new(run_id: RunId, cancel_token: CancellationToken) -> Self {
        Self {
            run_id,
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Same run and token, fresh action id.
    pub fn next_action(&self) -> Self {
        Self::new(self.run_id.clone(), self.cancel_token.clone())
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Default for ExecCtx {
    fn default() -> Self {
        Self::new(RunId::new(), CancellationToken::new())
    }
}

/// What an action handler receives besides its raw parameters.
#[derive(Clone, Debug, Default)]
pub struct ActionCallContext {
    /// Element for the action's primary locate field, or the element produced
    /// by a preceding standalone `Locate` step.
    pub element: Option<ResolvedElement>,
    /// Every resolved locate field, keyed by parameter name.
    pub located: BTreeMap<String, ResolvedElement>,
    pub exec: ExecCtx,
}

impl ActionCallContext {
    pub fn located(&self, field: &str) -> Option<&ResolvedElement> {
        self.located.get(field)
    }
}
