use std::collections::BTreeMap;

use crate::geometry::{Point, Rect};

/// One node of the element tree a device reports with its snapshot.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementNode {
    pub id: String,
    pub rect: Rect,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub text: Option<String>,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    pub attributes: BTreeMap<String, String>,
}

impl ElementNode {
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            rect,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Flattened element tree in document order.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementTree {
    pub nodes: Vec<ElementNode>,
}

impl ElementTree {
    pub fn new(nodes: Vec<ElementNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementNode> {
        self.nodes.iter()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&ElementNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Smallest node whose rect contains `point`; earlier nodes win ties.
    pub fn smallest_containing(&self, point: Point) -> Option<&ElementNode> {
        self.nodes
            .iter()
            .filter(|node| node.rect.contains(point))
            .fold(None, |best: Option<&ElementNode>, node| match best {
                Some(current) if current.rect.area() <= node.rect.area() => Some(current),
                _ => Some(node),
            })
    }
}

/// A live element handle. Only the locator produces these.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedElement {
    pub id: String,
    pub center: Point,
    pub rect: Rect,
}

impl ResolvedElement {
    pub fn from_rect(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            center: rect.center(),
            rect,
        }
    }
}

impl From<&ElementNode> for ResolvedElement {
    fn from(node: &ElementNode) -> Self {
        Self::from_rect(node.id.clone(), node.rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ElementTree {
        ElementTree::new(vec![
            ElementNode::new("body", Rect::new(0.0, 0.0, 800.0, 600.0)),
            ElementNode::new("form", Rect::new(100.0, 100.0, 300.0, 200.0)),
            ElementNode::new("button", Rect::new(150.0, 150.0, 80.0, 30.0)).with_text("Search"),
        ])
    }

    #[test]
    fn smallest_containing_prefers_innermost() {
        let tree = tree();
        let hit = tree.smallest_containing(Point::new(160.0, 160.0)).unwrap();
        assert_eq!(hit.id, "button");

        let hit = tree.smallest_containing(Point::new(10.0, 10.0)).unwrap();
        assert_eq!(hit.id, "body");

        assert!(tree.smallest_containing(Point::new(900.0, 10.0)).is_none());
    }

    #[test]
    fn resolved_element_uses_rect_center() {
        let tree = tree();
        let element = ResolvedElement::from(tree.find_by_id("button").unwrap());
        assert_eq!(element.center, Point::new(190.0, 165.0));
    }
}
