//! Persisted cache document.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tapline_core_types::Size;

/// Kind of a [`CacheRecord`]; occurrence ranks are counted per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    Plan,
    UiTarsPlan,
    Locate,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Plan => "plan",
            CacheKind::UiTarsPlan => "ui-tars-plan",
            CacheKind::Locate => "locate",
        }
    }

    pub fn is_plan(&self) -> bool {
        matches!(self, CacheKind::Plan | CacheKind::UiTarsPlan)
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page state a cached plan was produced against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub url: String,
    pub size: Size,
}

impl PageContext {
    pub fn new(url: impl Into<String>, size: Size) -> Self {
        Self {
            url: url.into(),
            size,
        }
    }

    /// Only width and height gate replay; URL and content are not compared.
    pub fn matches_viewport(&self, size: &Size) -> bool {
        self.size.same_viewport(size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheRecord {
    #[serde(rename = "locate")]
    Locate { prompt: String, xpaths: Vec<String> },
    #[serde(rename = "plan")]
    Plan {
        prompt: String,
        #[serde(rename = "pageContext")]
        page_context: PageContext,
        response: Value,
    },
    #[serde(rename = "ui-tars-plan")]
    UiTarsPlan {
        prompt: String,
        #[serde(rename = "pageContext")]
        page_context: PageContext,
        response: Value,
    },
}

impl CacheRecord {
    /// `None` when there is nothing worth caching.
    pub fn locate(prompt: impl Into<String>, xpaths: Vec<String>) -> Option<Self> {
        let xpaths: Vec<String> = xpaths.into_iter().filter(|x| !x.is_empty()).collect();
        if xpaths.is_empty() {
            return None;
        }
        Some(CacheRecord::Locate {
            prompt: prompt.into(),
            xpaths,
        })
    }

    pub fn plan(
        kind: CacheKind,
        prompt: impl Into<String>,
        page_context: PageContext,
        response: Value,
    ) -> Self {
        let prompt = prompt.into();
        match kind {
            CacheKind::UiTarsPlan => CacheRecord::UiTarsPlan {
                prompt,
                page_context,
                response,
            },
            _ => CacheRecord::Plan {
                prompt,
                page_context,
                response,
            },
        }
    }

    pub fn kind(&self) -> CacheKind {
        match self {
            CacheRecord::Locate { .. } => CacheKind::Locate,
            CacheRecord::Plan { .. } => CacheKind::Plan,
            CacheRecord::UiTarsPlan { .. } => CacheKind::UiTarsPlan,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            CacheRecord::Locate { prompt, .. }
            | CacheRecord::Plan { prompt, .. }
            | CacheRecord::UiTarsPlan { prompt, .. } => prompt,
        }
    }

    pub fn xpaths(&self) -> Option<&[String]> {
        match self {
            CacheRecord::Locate { xpaths, .. } => Some(xpaths),
            _ => None,
        }
    }

    pub fn plan_parts(&self) -> Option<(&PageContext, &Value)> {
        match self {
            CacheRecord::Plan {
                page_context,
                response,
                ..
            }
            | CacheRecord::UiTarsPlan {
                page_context,
                response,
                ..
            } => Some((page_context, response)),
            CacheRecord::Locate { .. } => None,
        }
    }

    /// Records that must never be written.
    pub fn is_empty(&self) -> bool {
        match self {
            CacheRecord::Locate { xpaths, .. } => xpaths.iter().all(|x| x.is_empty()),
            _ => false,
        }
    }
}

/// One occurrence of a prompt. Several groups may share a prompt; their
/// relative order is the occurrence rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptGroup {
    pub prompt: String,
    #[serde(default)]
    pub records: Vec<CacheRecord>,
    #[serde(default)]
    pub used_count: u32,
}

impl PromptGroup {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            records: Vec::new(),
            used_count: 0,
        }
    }

    pub fn record(&self, kind: CacheKind) -> Option<&CacheRecord> {
        self.records.iter().find(|record| record.kind() == kind)
    }

    /// Replace the record of the same kind, or append.
    pub fn upsert(&mut self, record: CacheRecord) {
        let kind = record.kind();
        match self.records.iter_mut().find(|r| r.kind() == kind) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFile {
    pub tool_version: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub package_version: String,
    pub cache_id: String,
    #[serde(default)]
    pub prompt_groups: Vec<PromptGroup>,
}

impl CacheFile {
    pub fn new(
        cache_id: impl Into<String>,
        package_name: impl Into<String>,
        package_version: impl Into<String>,
    ) -> Self {
        Self {
            tool_version: crate::TOOL_VERSION.to_string(),
            package_name: package_name.into(),
            package_version: package_version.into(),
            cache_id: cache_id.into(),
            prompt_groups: Vec::new(),
        }
    }

    /// Indices of the groups holding `prompt`, in file order.
    pub fn group_indices(&self, prompt: &str) -> Vec<usize> {
        self.prompt_groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.prompt == prompt)
            .map(|(index, _)| index)
            .collect()
    }

    /// Index of the group for occurrence `rank` of `prompt`, appending empty
    /// groups until it exists.
    pub fn group_for_rank(&mut self, prompt: &str, rank: usize) -> usize {
        let mut indices = self.group_indices(prompt);
        while indices.len() <= rank {
            self.prompt_groups.push(PromptGroup::new(prompt));
            indices.push(self.prompt_groups.len() - 1);
        }
        indices[rank]
    }

    /// Copy prepared for writing: empty records dropped, plan records ahead of
    /// locate records within each group.
    pub fn normalized(&self) -> CacheFile {
        let mut file = self.clone();
        for group in &mut file.prompt_groups {
            group.records.retain(|record| !record.is_empty());
            group.records.sort_by_key(CacheRecord::kind);
        }
        file
    }

    pub fn record_count(&self) -> usize {
        self.prompt_groups.iter().map(|g| g.records.len()).sum()
    }

    /// Structural problems a hand-edited or foreign file may carry.
    pub fn lint(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (index, group) in self.prompt_groups.iter().enumerate() {
            if group.prompt.is_empty() {
                issues.push(format!("group {index}: empty prompt"));
            }
            for record in &group.records {
                if record.prompt() != group.prompt {
                    issues.push(format!(
                        "group {index}: {} record prompt {:?} differs from group prompt {:?}",
                        record.kind(),
                        record.prompt(),
                        group.prompt
                    ));
                }
                if record.is_empty() {
                    issues.push(format!("group {index}: locate record with no xpaths"));
                }
            }
            let mut kinds: Vec<CacheKind> = group.records.iter().map(CacheRecord::kind).collect();
            let total = kinds.len();
            kinds.sort();
            kinds.dedup();
            if kinds.len() != total {
                issues.push(format!("group {index}: duplicate records of the same kind"));
            }
        }
        issues
    }
}
