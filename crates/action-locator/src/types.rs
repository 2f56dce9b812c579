//! Core types for the locate resolver

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tapline_core_types::{HitBy, LocateParams, PageSnapshot, ResolvedElement};
use task_cache::CacheLookup;

/// Resolution tiers, cheapest and most trusted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocateTier {
    /// Caller-supplied xpath
    UserExpectedPath,

    /// Xpaths recorded by an earlier run
    Cache,

    /// Id or bbox the planner already attached to the step
    Planning,

    /// Model inference over a fresh snapshot
    AiModel,
}

impl LocateTier {
    pub fn name(&self) -> &'static str {
        match self {
            LocateTier::UserExpectedPath => "user-expected-path",
            LocateTier::Cache => "cache",
            LocateTier::Planning => "planning",
            LocateTier::AiModel => "ai-model",
        }
    }

    /// Get all tiers in fallback order
    pub fn fallback_chain() -> Vec<LocateTier> {
        vec![
            LocateTier::UserExpectedPath,
            LocateTier::Cache,
            LocateTier::Planning,
            LocateTier::AiModel,
        ]
    }
}

/// State shared by every locate in one planning round.
///
/// The snapshot is the one the planner saw. The planner's bbox describes that
/// snapshot, so only the first bbox match of the round is trusted.
#[derive(Debug)]
pub struct PlanRound {
    snapshot: Arc<PageSnapshot>,
    bbox_consumed: AtomicBool,
}

impl PlanRound {
    pub fn new(snapshot: impl Into<Arc<PageSnapshot>>) -> Self {
        Self {
            snapshot: snapshot.into(),
            bbox_consumed: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> &PageSnapshot {
        &self.snapshot
    }

    pub fn shared_snapshot(&self) -> Arc<PageSnapshot> {
        self.snapshot.clone()
    }

    /// `true` exactly once per round.
    pub fn try_consume_bbox(&self) -> bool {
        !self.bbox_consumed.swap(true, Ordering::SeqCst)
    }

    pub fn bbox_consumed(&self) -> bool {
        self.bbox_consumed.load(Ordering::SeqCst)
    }
}

/// What a single tier sees.
#[derive(Debug, Clone, Copy)]
pub struct TierInput<'a> {
    pub params: &'a LocateParams,
    pub round: &'a PlanRound,
    /// Cache lookup claimed for this request, if the request has a prompt.
    pub cached: Option<&'a CacheLookup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierHit {
    pub element: ResolvedElement,
    pub hit_by: HitBy,
}

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocateOutcome {
    pub element: ResolvedElement,
    pub hit_by: HitBy,
    pub tier: LocateTier,
    /// Xpaths written to the cache after this resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_xpaths: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_chain_order() {
        assert_eq!(
            LocateTier::fallback_chain(),
            vec![
                LocateTier::UserExpectedPath,
                LocateTier::Cache,
                LocateTier::Planning,
                LocateTier::AiModel
            ]
        );
    }

    #[test]
    fn bbox_is_consumed_once() {
        let round = PlanRound::new(PageSnapshot::default());
        assert!(!round.bbox_consumed());
        assert!(round.try_consume_bbox());
        assert!(!round.try_consume_bbox());
        assert!(round.bbox_consumed());
    }
}
