use crate::geometry::Bbox;

/// Target description carried by a plan step.
///
/// Any combination of fields may be present; the locator decides which tier
/// uses which field.
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)
)]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocateParams {
    /// Natural-language description of the element.
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub prompt: Option<String>,
    /// Element id from the snapshot the plan was produced against.
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub id: Option<String>,
    /// `[left, top, right, bottom]` reported by the planner.
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub bbox: Option<Bbox>,
    /// Caller-supplied structural path; takes precedence over everything.
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub xpath: Option<String>,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub cacheable: Option<bool>,
}

impl LocateParams {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_bbox(mut self, bbox: Bbox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    /// Absent means cacheable.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable != Some(false)
    }

    /// True when no tier could use these params: the planner's `"null"` id
    /// marker, or no prompt, id, bbox or xpath at all.
    pub fn is_null_target(&self) -> bool {
        self.id.as_deref() == Some("null")
            || (self.prompt.is_none()
                && self.id.is_none()
                && self.bbox.is_none()
                && self.xpath.is_none())
    }

    /// Human-readable label used in errors and logs.
    pub fn describe(&self) -> String {
        if let Some(prompt) = &self.prompt {
            return prompt.clone();
        }
        if let Some(xpath) = &self.xpath {
            return format!("xpath {xpath}");
        }
        if let Some(id) = &self.id {
            return format!("id {id}");
        }
        if let Some(bbox) = &self.bbox {
            return format!("bbox {bbox:?}");
        }
        "<empty locate>".to_string()
    }

    /// Reads locate params from a step parameter; a bare string is a prompt.
    #[cfg(feature = "serde-full")]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(prompt) => Some(Self::from_prompt(prompt.clone())),
            other => serde_json::from_value(other.clone()).ok(),
        }
    }
}

/// Which locate tier produced an element. Diagnostic only.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(tag = "from", content = "context"))]
#[derive(Clone, Debug, PartialEq)]
pub enum HitBy {
    #[cfg_attr(feature = "serde-full", serde(rename = "User expected path"))]
    UserExpectedPath { xpath: String },
    #[cfg_attr(feature = "serde-full", serde(rename = "Cache"))]
    Cache { xpaths: Vec<String> },
    #[cfg_attr(feature = "serde-full", serde(rename = "Planning"))]
    Planning {
        id: Option<String>,
        bbox: Option<Bbox>,
    },
    #[cfg_attr(feature = "serde-full", serde(rename = "AI model"))]
    AiModel { prompt: Option<String> },
}

impl HitBy {
    pub fn label(&self) -> &'static str {
        match self {
            HitBy::UserExpectedPath { .. } => "User expected path",
            HitBy::Cache { .. } => "Cache",
            HitBy::Planning { .. } => "Planning",
            HitBy::AiModel { .. } => "AI model",
        }
    }

    pub fn is_cache(&self) -> bool {
        matches!(self, HitBy::Cache { .. })
    }
}
