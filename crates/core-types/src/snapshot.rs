use crate::element::ElementTree;
use crate::geometry::Size;

/// What the device reports about the page at one instant.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageSnapshot {
    /// Base64 data URI.
    pub screenshot: String,
    pub tree: ElementTree,
    pub size: Size,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub url: Option<String>,
}

impl PageSnapshot {
    pub fn new(screenshot: impl Into<String>, tree: ElementTree, size: Size) -> Self {
        Self {
            screenshot: screenshot.into(),
            tree,
            size,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
