//! Registry mapping action names to handlers and parameter schemas.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::ActionError;
use crate::types::ActionCallContext;

/// Schema keyword marking a property as a locate target in hand-written
/// schemas. Generated schemas are recognised by their `LocateParams` reference.
pub const LOCATE_MARKER: &str = "x-locate";

const LOCATE_DEFINITION: &str = "/LocateParams";

/// Executes one action on the device.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(&self, params: &Value, ctx: &ActionCallContext) -> Result<(), ActionError>;
}

/// Adapts a synchronous closure into an [`ActionHandler`].
pub struct FnActionHandler<F>(F);

#[async_trait]
impl<F> ActionHandler for FnActionHandler<F>
where
    F: Fn(&Value, &ActionCallContext) -> Result<(), ActionError> + Send + Sync,
{
    async fn invoke(&self, params: &Value, ctx: &ActionCallContext) -> Result<(), ActionError> {
        (self.0)(params, ctx)
    }
}

pub fn handler_fn<F>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(&Value, &ActionCallContext) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Arc::new(FnActionHandler(f))
}

/// One invocable device action.
#[derive(Clone)]
pub struct DeviceAction {
    pub name: String,
    pub description: String,
    pub param_schema: Option<Value>,
    handler: Arc<dyn ActionHandler>,
    validator: Option<Arc<jsonschema::Validator>>,
}

impl fmt::Debug for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAction")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("param_schema", &self.param_schema)
            .finish()
    }
}

impl DeviceAction {
    /// Compiles `param_schema` up front so a broken schema fails at
    /// registration rather than on first use.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        param_schema: Option<Value>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, ActionError> {
        let name = name.into();
        let validator = match &param_schema {
            Some(schema) => Some(Arc::new(jsonschema::validator_for(schema).map_err(
                |err| ActionError::invalid_params(&name, format!("schema does not compile: {err}")),
            )?)),
            None => None,
        };
        Ok(Self {
            name,
            description: description.into(),
            param_schema,
            handler,
            validator,
        })
    }

    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }

    /// Rejects parameters that do not satisfy the schema. Actions without a
    /// schema accept anything.
    pub fn validate(&self, params: &Value) -> Result<(), ActionError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let problems: Vec<String> = validator
            .iter_errors(params)
            .map(|err| err.to_string())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ActionError::invalid_params(&self.name, problems.join("; ")))
        }
    }

    /// Names of the parameters that hold locate targets, sorted by name.
    pub fn locate_fields(&self, required_only: bool) -> Vec<String> {
        let Some(schema) = &self.param_schema else {
            return Vec::new();
        };
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        properties
            .iter()
            .filter(|(_, property)| is_locate_schema(property))
            .filter(|(name, _)| !required_only || required.contains(&name.as_str()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn invoke(&self, params: &Value, ctx: &ActionCallContext) -> Result<(), ActionError> {
        debug!(action = %self.name, action_id = %ctx.exec.action_id, "invoking device action");
        self.handler.invoke(params, ctx).await
    }

    pub fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            param_schema: self.param_schema.clone(),
        }
    }
}

fn is_locate_schema(property: &Value) -> bool {
    if property.get(LOCATE_MARKER).and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
        if reference.ends_with(LOCATE_DEFINITION) {
            return true;
        }
    }
    ["anyOf", "allOf", "oneOf"].iter().any(|keyword| {
        property
            .get(*keyword)
            .and_then(Value::as_array)
            .map(|variants| variants.iter().any(is_locate_schema))
            .unwrap_or(false)
    })
}

/// Serializable view of an action, handed to the planner.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_schema: Option<Value>,
}

/// Ordered set of device actions keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ActionSpace {
    actions: Vec<DeviceAction>,
}

impl ActionSpace {
    pub fn new(actions: Vec<DeviceAction>) -> Self {
        let mut space = Self::default();
        for action in actions {
            space.register(action);
        }
        space
    }

    /// Adds `action`, replacing any action with the same name.
    pub fn register(&mut self, action: DeviceAction) {
        if let Some(existing) = self.actions.iter_mut().find(|a| a.name == action.name) {
            *existing = action;
        } else {
            self.actions.push(action);
        }
    }

    pub fn get(&self, name: &str) -> Option<&DeviceAction> {
        self.actions.iter().find(|action| action.name == name)
    }

    /// Fails closed on unknown names.
    pub fn require(&self, name: &str) -> Result<&DeviceAction, ActionError> {
        self.get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn catalog(&self) -> Vec<ActionDescriptor> {
        self.actions.iter().map(DeviceAction::descriptor).collect()
    }

    /// A copy holding only the allow-listed actions. Used by invoke-by-name
    /// surfaces so callers cannot reach actions outside the list.
    pub fn restrict(&self, allow: &[&str]) -> Self {
        Self {
            actions: self
                .actions
                .iter()
                .filter(|action| allow.contains(&action.name.as_str()))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Arc<dyn ActionHandler> {
        handler_fn(|_, _| Ok(()))
    }

    fn swipe() -> DeviceAction {
        DeviceAction::new(
            "Swipe",
            "Swipe between two points",
            Some(json!({
                "type": "object",
                "properties": {
                    "from": {"type": "object", "x-locate": true},
                    "to": {"type": "object", "x-locate": true},
                    "durationMs": {"type": "integer", "minimum": 0}
                },
                "required": ["from"]
            })),
            noop(),
        )
        .unwrap()
    }

    #[test]
    fn unknown_action_fails_closed() {
        let space = ActionSpace::new(vec![swipe()]);
        assert_eq!(
            space.require("Hover").unwrap_err(),
            ActionError::UnknownAction("Hover".into())
        );
        assert!(space.require("Swipe").is_ok());
    }

    #[test]
    fn marker_properties_are_locate_fields() {
        let action = swipe();
        assert_eq!(action.locate_fields(false), vec!["from", "to"]);
        assert_eq!(action.locate_fields(true), vec!["from"]);
    }

    #[test]
    fn validation_reports_schema_violations() {
        let action = swipe();
        assert!(action.validate(&json!({"from": {}, "durationMs": 10})).is_ok());
        let err = action.validate(&json!({"durationMs": -1})).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { ref action, .. } if action == "Swipe"));
    }

    #[test]
    fn restrict_keeps_only_allowed_names() {
        let space = ActionSpace::new(vec![
            swipe(),
            DeviceAction::new("Back", "Navigate back", None, noop()).unwrap(),
        ]);
        let restricted = space.restrict(&["Back"]);
        assert_eq!(restricted.names(), vec!["Back"]);
        assert!(restricted.require("Swipe").is_err());
    }

    #[test]
    fn register_replaces_same_name() {
        let mut space = ActionSpace::new(vec![swipe()]);
        space.register(DeviceAction::new("Swipe", "replacement", None, noop()).unwrap());
        assert_eq!(space.len(), 1);
        assert_eq!(space.get("Swipe").unwrap().description, "replacement");
    }
}
