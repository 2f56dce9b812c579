//! The seam between the engine and a concrete device backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tapline_core_types::{PageSnapshot, ResolvedElement};

use crate::action_space::ActionSpace;
use crate::errors::ActionError;

/// A browser tab, Android device or iOS simulator as seen by the engine.
///
/// Implementations own transport and timeout discipline; the engine never
/// wraps these calls in its own timeouts.
#[async_trait]
pub trait DeviceInterface: Send + Sync {
    /// Short backend label, e.g. `"web"` or `"android"`.
    fn interface_type(&self) -> &str;

    /// Actions this device can perform.
    fn action_space(&self) -> Arc<ActionSpace>;

    /// Screenshot, element tree and viewport in one consistent capture.
    async fn snapshot(&self) -> Result<PageSnapshot, ActionError>;

    async fn screenshot_base64(&self) -> Result<String, ActionError>;

    /// Resolve a structural path against the live page. Must return `None`
    /// unless the path matches exactly one element.
    async fn resolve_xpath(&self, xpath: &str) -> Result<Option<ResolvedElement>, ActionError>;

    /// Structural paths that re-find `element` on a later run, best first.
    async fn derive_xpath(
        &self,
        element: &ResolvedElement,
    ) -> Result<Option<Vec<String>>, ActionError>;

    fn supports_idle_wait(&self) -> bool {
        false
    }

    /// Wait for network/UI quiet. Only called when `supports_idle_wait`.
    async fn wait_for_idle(&self) -> Result<(), ActionError> {
        Ok(())
    }

    async fn before_invoke_action(&self, _name: &str, _params: &Value) -> Result<(), ActionError> {
        Ok(())
    }

    async fn after_invoke_action(&self, _name: &str, _params: &Value) -> Result<(), ActionError> {
        Ok(())
    }
}
