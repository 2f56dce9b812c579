//! Typed parameters and schemas for the actions every device is expected to
//! offer. Devices pair these with their own handlers.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tapline_core_types::LocateParams;

use crate::action_space::{ActionHandler, DeviceAction};
use crate::errors::ActionError;

pub const TAP: &str = "Tap";
pub const INPUT: &str = "Input";
pub const SCROLL: &str = "Scroll";
pub const DRAG: &str = "Drag";
pub const KEYBOARD_PRESS: &str = "KeyboardPress";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TapParams {
    /// Element to tap; falls back to the element of a preceding Locate step.
    pub locate: Option<LocateParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputParams {
    /// Final text of the field.
    pub value: String,
    pub locate: Option<LocateParams>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ScrollType {
    #[default]
    Once,
    UntilBottom,
    UntilTop,
    UntilLeft,
    UntilRight,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
    Left,
    Right,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrollParams {
    #[serde(default)]
    pub scroll_type: ScrollType,
    #[serde(default)]
    pub direction: ScrollDirection,
    /// Pixels; the device picks a page-sized step when absent.
    pub distance: Option<u32>,
    /// Scroll inside this element instead of the viewport.
    pub locate: Option<LocateParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DragParams {
    pub from: LocateParams,
    pub to: LocateParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardPressParams {
    /// Key name, e.g. `Enter` or `Control+A`.
    pub key: String,
    pub locate: Option<LocateParams>,
}

/// JSON schema for `T`, as handed to the planner and used for validation.
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

/// Decode handler parameters into their typed form.
pub fn parse_params<T: for<'de> Deserialize<'de>>(
    action: &str,
    params: &Value,
) -> Result<T, ActionError> {
    serde_json::from_value(params.clone())
        .map_err(|err| ActionError::invalid_params(action, err.to_string()))
}

pub fn tap(handler: Arc<dyn ActionHandler>) -> Result<DeviceAction, ActionError> {
    DeviceAction::new(
        TAP,
        "Tap the located element",
        Some(schema_of::<TapParams>()),
        handler,
    )
}

pub fn input(handler: Arc<dyn ActionHandler>) -> Result<DeviceAction, ActionError> {
    DeviceAction::new(
        INPUT,
        "Replace the content of an input field with `value`",
        Some(schema_of::<InputParams>()),
        handler,
    )
}

pub fn scroll(handler: Arc<dyn ActionHandler>) -> Result<DeviceAction, ActionError> {
    DeviceAction::new(
        SCROLL,
        "Scroll the viewport or a located container",
        Some(schema_of::<ScrollParams>()),
        handler,
    )
}

pub fn drag(handler: Arc<dyn ActionHandler>) -> Result<DeviceAction, ActionError> {
    DeviceAction::new(
        DRAG,
        "Drag from one located element to another",
        Some(schema_of::<DragParams>()),
        handler,
    )
}

pub fn keyboard_press(handler: Arc<dyn ActionHandler>) -> Result<DeviceAction, ActionError> {
    DeviceAction::new(
        KEYBOARD_PRESS,
        "Press a key, optionally focusing a located element first",
        Some(schema_of::<KeyboardPressParams>()),
        handler,
    )
}
