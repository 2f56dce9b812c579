//! Resolution tiers
//!
//! Four strategies in fallback order:
//! 1. User expected path - caller-supplied xpath
//! 2. Cache - xpaths recorded by an earlier run
//! 3. Planning - id or bbox from the plan, matched against the round snapshot
//! 4. AI model - inference over a fresh snapshot

use std::sync::Arc;

use action_primitives::DeviceInterface;
use async_trait::async_trait;
use tapline_core_types::{HitBy, Rect, ResolvedElement};
use tracing::{debug, warn};

use crate::bridge::AiLocator;
use crate::errors::LocatorError;
use crate::types::{LocateTier, TierHit, TierInput};

/// One resolution tier. `Ok(None)` means the tier does not apply or missed.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn resolve(&self, input: &TierInput<'_>) -> Result<Option<TierHit>, LocatorError>;

    fn tier(&self) -> LocateTier;

    fn name(&self) -> &'static str {
        self.tier().name()
    }
}

pub struct UserPathStrategy {
    device: Arc<dyn DeviceInterface>,
}

impl UserPathStrategy {
    pub fn new(device: Arc<dyn DeviceInterface>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl Strategy for UserPathStrategy {
    async fn resolve(&self, input: &TierInput<'_>) -> Result<Option<TierHit>, LocatorError> {
        let Some(xpath) = &input.params.xpath else {
            return Ok(None);
        };
        debug!(xpath = %xpath, "resolving user expected path");
        let element = self.device.resolve_xpath(xpath).await?;
        Ok(element.map(|element| TierHit {
            element,
            hit_by: HitBy::UserExpectedPath {
                xpath: xpath.clone(),
            },
        }))
    }

    fn tier(&self) -> LocateTier {
        LocateTier::UserExpectedPath
    }
}

pub struct CachedPathStrategy {
    device: Arc<dyn DeviceInterface>,
}

impl CachedPathStrategy {
    pub fn new(device: Arc<dyn DeviceInterface>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl Strategy for CachedPathStrategy {
    async fn resolve(&self, input: &TierInput<'_>) -> Result<Option<TierHit>, LocatorError> {
        if !input.params.is_cacheable() {
            return Ok(None);
        }
        let Some(xpaths) = input.cached.and_then(|lookup| lookup.xpaths()) else {
            return Ok(None);
        };

        for xpath in xpaths {
            match self.device.resolve_xpath(xpath).await {
                Ok(Some(element)) => {
                    return Ok(Some(TierHit {
                        element,
                        hit_by: HitBy::Cache {
                            xpaths: xpaths.to_vec(),
                        },
                    }));
                }
                Ok(None) => debug!(xpath = %xpath, "cached xpath no longer resolves"),
                Err(err) => warn!(xpath = %xpath, error = %err, "cached xpath lookup failed"),
            }
        }
        Ok(None)
    }

    fn tier(&self) -> LocateTier {
        LocateTier::Cache
    }
}

/// Matches the plan's id or bbox against the round snapshot. No device calls.
#[derive(Default)]
pub struct PlanStrategy;

impl PlanStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Strategy for PlanStrategy {
    async fn resolve(&self, input: &TierInput<'_>) -> Result<Option<TierHit>, LocatorError> {
        let params = input.params;
        let tree = &input.round.snapshot().tree;

        if let Some(id) = params.id.as_deref().filter(|id| *id != "null") {
            if let Some(node) = tree.find_by_id(id) {
                return Ok(Some(TierHit {
                    element: ResolvedElement::from(node),
                    hit_by: HitBy::Planning {
                        id: Some(id.to_string()),
                        bbox: None,
                    },
                }));
            }
            debug!(id, "plan id not present in round snapshot");
        }

        let Some(bbox) = params.bbox else {
            return Ok(None);
        };
        if !input.round.try_consume_bbox() {
            debug!(?bbox, "bbox already used this round; deferring to later tiers");
            return Ok(None);
        }
        let rect = Rect::from_bbox(bbox)
            .map_err(|err| LocatorError::InvalidRequest(err.to_string()))?;
        let center = rect.center();
        let element = match tree.smallest_containing(center) {
            Some(node) => ResolvedElement::from(node),
            None => ResolvedElement::from_rect(
                format!("bbox:{},{},{},{}", bbox[0], bbox[1], bbox[2], bbox[3]),
                rect,
            ),
        };
        Ok(Some(TierHit {
            element,
            hit_by: HitBy::Planning {
                id: None,
                bbox: Some(bbox),
            },
        }))
    }

    fn tier(&self) -> LocateTier {
        LocateTier::Planning
    }
}

pub struct AiModelStrategy {
    device: Arc<dyn DeviceInterface>,
    ai: Arc<dyn AiLocator>,
}

impl AiModelStrategy {
    pub fn new(device: Arc<dyn DeviceInterface>, ai: Arc<dyn AiLocator>) -> Self {
        Self { device, ai }
    }
}

#[async_trait]
impl Strategy for AiModelStrategy {
    async fn resolve(&self, input: &TierInput<'_>) -> Result<Option<TierHit>, LocatorError> {
        if input.params.prompt.is_none() {
            return Ok(None);
        }
        // Earlier steps of the round may have changed the page.
        let snapshot = self.device.snapshot().await?;
        let element = self.ai.locate(input.params, &snapshot).await?;
        Ok(element.map(|element| TierHit {
            element,
            hit_by: HitBy::AiModel {
                prompt: input.params.prompt.clone(),
            },
        }))
    }

    fn tier(&self) -> LocateTier {
        LocateTier::AiModel
    }
}
