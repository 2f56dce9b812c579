//! Deterministic in-memory device used for tests and offline development.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tapline_core_types::{ElementNode, ElementTree, PageSnapshot, Rect, ResolvedElement, Size};

use crate::action_space::{ActionHandler, ActionSpace};
use crate::builtin;
use crate::device::DeviceInterface;
use crate::errors::ActionError;
use crate::types::ActionCallContext;

/// One element of the mock page.
#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    pub id: String,
    pub rect: Rect,
    pub text: Option<String>,
    pub xpath: Option<String>,
}

impl MockElement {
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            rect,
            text: None,
            xpath: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    fn resolved(&self) -> ResolvedElement {
        ResolvedElement::from_rect(self.id.clone(), self.rect)
    }
}

/// A recorded action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub action: String,
    pub params: Value,
    pub element: Option<ResolvedElement>,
}

#[derive(Debug, Default)]
struct MockState {
    elements: Vec<MockElement>,
    size: Size,
    invocations: Vec<Invocation>,
    snapshots: usize,
    screenshots: usize,
    idle_waits: usize,
    remove_on_tap: bool,
    derive_xpaths: bool,
    idle_wait: bool,
}

/// Device backed by a list of [`MockElement`]s.
///
/// Every builtin action is registered and recorded; `Tap` can optionally
/// remove the tapped element to model lists that shrink.
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    url: String,
    space: Arc<ActionSpace>,
}

struct RecordingHandler {
    action: &'static str,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    async fn invoke(&self, params: &Value, ctx: &ActionCallContext) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        if self.action == builtin::TAP {
            let Some(element) = &ctx.element else {
                return Err(ActionError::missing_locate(builtin::TAP, "locate"));
            };
            if state.remove_on_tap {
                state.elements.retain(|candidate| candidate.id != element.id);
            }
        }
        state.invocations.push(Invocation {
            action: self.action.to_string(),
            params: params.clone(),
            element: ctx.element.clone(),
        });
        Ok(())
    }
}

impl MockDevice {
    pub fn new(size: Size) -> Self {
        let state = Arc::new(Mutex::new(MockState {
            size,
            derive_xpaths: true,
            ..Default::default()
        }));
        let space = Self::builtin_space(&state);
        Self {
            state,
            url: "https://mock.tapline.test/".to_string(),
            space: Arc::new(space),
        }
    }

    fn builtin_space(state: &Arc<Mutex<MockState>>) -> ActionSpace {
        let recorder = |action: &'static str| -> Arc<dyn ActionHandler> {
            Arc::new(RecordingHandler {
                action,
                state: state.clone(),
            })
        };
        let actions = [
            builtin::tap(recorder(builtin::TAP)),
            builtin::input(recorder(builtin::INPUT)),
            builtin::scroll(recorder(builtin::SCROLL)),
            builtin::drag(recorder(builtin::DRAG)),
            builtin::keyboard_press(recorder(builtin::KEYBOARD_PRESS)),
        ];
        // Builtin schemas are generated from typed structs and always compile.
        ActionSpace::new(actions.into_iter().filter_map(Result::ok).collect())
    }

    pub fn with_element(self, element: MockElement) -> Self {
        self.state.lock().elements.push(element);
        self
    }

    pub fn with_elements(self, elements: impl IntoIterator<Item = MockElement>) -> Self {
        self.state.lock().elements.extend(elements);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the action space, e.g. to add custom actions.
    pub fn with_action_space(mut self, space: ActionSpace) -> Self {
        self.space = Arc::new(space);
        self
    }

    pub fn remove_on_tap(self) -> Self {
        self.state.lock().remove_on_tap = true;
        self
    }

    pub fn without_xpath_derivation(self) -> Self {
        self.state.lock().derive_xpaths = false;
        self
    }

    pub fn with_idle_wait(self) -> Self {
        self.state.lock().idle_wait = true;
        self
    }

    /// Builtin action space bound to this device's recorder, for extending.
    pub fn builtin_action_space(&self) -> ActionSpace {
        Self::builtin_space(&self.state)
    }

    pub fn set_viewport(&self, size: Size) {
        self.state.lock().size = size;
    }

    pub fn remove_element(&self, id: &str) {
        self.state.lock().elements.retain(|element| element.id != id);
    }

    pub fn elements(&self) -> Vec<MockElement> {
        self.state.lock().elements.clone()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.lock().snapshots
    }

    pub fn screenshot_count(&self) -> usize {
        self.state.lock().screenshots
    }

    pub fn idle_wait_count(&self) -> usize {
        self.state.lock().idle_waits
    }
}

#[async_trait]
impl DeviceInterface for MockDevice {
    fn interface_type(&self) -> &str {
        "mock"
    }

    fn action_space(&self) -> Arc<ActionSpace> {
        self.space.clone()
    }

    async fn snapshot(&self) -> Result<PageSnapshot, ActionError> {
        let mut state = self.state.lock();
        state.snapshots += 1;
        let nodes = state
            .elements
            .iter()
            .map(|element| {
                let mut node = ElementNode::new(element.id.clone(), element.rect);
                node.text = element.text.clone();
                if let Some(xpath) = &element.xpath {
                    node = node.with_attribute("xpath", xpath.clone());
                }
                node
            })
            .collect();
        let screenshot = format!("data:image/png;base64,TU9DSw=={}", state.snapshots);
        Ok(PageSnapshot::new(screenshot, ElementTree::new(nodes), state.size).with_url(&self.url))
    }

    async fn screenshot_base64(&self) -> Result<String, ActionError> {
        let mut state = self.state.lock();
        state.screenshots += 1;
        Ok(format!(
            "data:image/png;base64,U0hPVA=={}",
            state.screenshots
        ))
    }

    async fn resolve_xpath(&self, xpath: &str) -> Result<Option<ResolvedElement>, ActionError> {
        let state = self.state.lock();
        let mut matches = state
            .elements
            .iter()
            .filter(|element| element.xpath.as_deref() == Some(xpath));
        match (matches.next(), matches.next()) {
            (Some(element), None) => Ok(Some(element.resolved())),
            _ => Ok(None),
        }
    }

    async fn derive_xpath(
        &self,
        element: &ResolvedElement,
    ) -> Result<Option<Vec<String>>, ActionError> {
        let state = self.state.lock();
        if !state.derive_xpaths {
            return Ok(None);
        }
        Ok(state
            .elements
            .iter()
            .find(|candidate| candidate.id == element.id)
            .and_then(|candidate| candidate.xpath.clone())
            .map(|xpath| vec![xpath]))
    }

    fn supports_idle_wait(&self) -> bool {
        self.state.lock().idle_wait
    }

    async fn wait_for_idle(&self) -> Result<(), ActionError> {
        self.state.lock().idle_waits += 1;
        Ok(())
    }
}
