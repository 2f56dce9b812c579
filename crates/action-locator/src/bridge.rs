//! Seam to the AI locate service.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tapline_core_types::{LocateParams, PageSnapshot, ResolvedElement};

use crate::errors::LocatorError;

/// Locates an element from a description and a snapshot by model inference.
#[async_trait]
pub trait AiLocator: Send + Sync {
    async fn locate(
        &self,
        params: &LocateParams,
        snapshot: &PageSnapshot,
    ) -> Result<Option<ResolvedElement>, LocatorError>;
}

/// Never locates anything. For cache-only replays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAiLocator;

#[async_trait]
impl AiLocator for NoAiLocator {
    async fn locate(
        &self,
        _params: &LocateParams,
        _snapshot: &PageSnapshot,
    ) -> Result<Option<ResolvedElement>, LocatorError> {
        Ok(None)
    }
}

/// Closure-backed locator that counts its calls. Deterministic stand-in for
/// the model in tests and offline development.
pub struct FnAiLocator<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnAiLocator<F>
where
    F: Fn(&LocateParams, &PageSnapshot) -> Option<ResolvedElement> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> AiLocator for FnAiLocator<F>
where
    F: Fn(&LocateParams, &PageSnapshot) -> Option<ResolvedElement> + Send + Sync,
{
    async fn locate(
        &self,
        params: &LocateParams,
        snapshot: &PageSnapshot,
    ) -> Result<Option<ResolvedElement>, LocatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.f)(params, snapshot))
    }
}

/// Locator that matches the prompt against node text, first match in
/// document order. Good enough for scripted scenarios.
pub fn text_matching_locator(
) -> FnAiLocator<impl Fn(&LocateParams, &PageSnapshot) -> Option<ResolvedElement> + Send + Sync> {
    FnAiLocator::new(|params: &LocateParams, snapshot: &PageSnapshot| {
        let prompt = params.prompt.as_deref()?.to_lowercase();
        snapshot
            .tree
            .iter()
            .find(|node| {
                node.text
                    .as_deref()
                    .map(|text| {
                        let text = text.to_lowercase();
                        !text.is_empty() && prompt.contains(&text)
                    })
                    .unwrap_or(false)
            })
            .map(ResolvedElement::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapline_core_types::{ElementNode, ElementTree, Rect, Size};

    fn todo_page() -> PageSnapshot {
        PageSnapshot::new(
            "data:",
            ElementTree::new(vec![
                ElementNode::new("title", Rect::new(0.0, 0.0, 400.0, 40.0)).with_text("Todos"),
                ElementNode::new("add", Rect::new(400.0, 0.0, 80.0, 40.0)).with_text("Add"),
            ]),
            Size::new(480, 320),
        )
    }

    #[test]
    fn text_matching_is_case_insensitive_and_counts_calls() {
        let locator = text_matching_locator();
        let page = todo_page();

        let hit = tokio_test::block_on(
            locator.locate(&LocateParams::from_prompt("the ADD button"), &page),
        )
        .unwrap()
        .unwrap();
        assert_eq!(hit.id, "add");

        let miss = tokio_test::block_on(
            locator.locate(&LocateParams::from_prompt("settings"), &page),
        )
        .unwrap();
        assert!(miss.is_none());
        assert_eq!(locator.calls(), 2);
    }

    #[test]
    fn no_locator_never_finds() {
        let found = tokio_test::block_on(
            NoAiLocator.locate(&LocateParams::from_prompt("Todos"), &todo_page()),
        )
        .unwrap();
        assert!(found.is_none());
    }
}
