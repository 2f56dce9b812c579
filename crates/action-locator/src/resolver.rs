//! Element resolver with fallback chain orchestration

use std::sync::Arc;

use action_primitives::DeviceInterface;
use async_trait::async_trait;
use tapline_core_types::LocateParams;
use task_cache::{CacheKind, CacheRecord, SharedTaskCache};
use tracing::{debug, info, warn};

use crate::bridge::AiLocator;
use crate::errors::LocatorError;
use crate::strategies::{
    AiModelStrategy, CachedPathStrategy, PlanStrategy, Strategy, UserPathStrategy,
};
use crate::types::{LocateOutcome, LocateTier, PlanRound, TierHit, TierInput};

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Resolve one locate request; the first tier that succeeds wins.
    async fn resolve(
        &self,
        params: &LocateParams,
        round: &PlanRound,
    ) -> Result<LocateOutcome, LocatorError>;
}

/// Default element resolver implementation
pub struct DefaultElementResolver {
    device: Arc<dyn DeviceInterface>,
    cache: Option<SharedTaskCache>,
    user_path_strategy: Arc<UserPathStrategy>,
    cached_path_strategy: Arc<CachedPathStrategy>,
    plan_strategy: Arc<PlanStrategy>,
    ai_strategy: Arc<AiModelStrategy>,
}

impl DefaultElementResolver {
    pub fn new(
        device: Arc<dyn DeviceInterface>,
        ai: Arc<dyn AiLocator>,
        cache: Option<SharedTaskCache>,
    ) -> Self {
        Self {
            user_path_strategy: Arc::new(UserPathStrategy::new(device.clone())),
            cached_path_strategy: Arc::new(CachedPathStrategy::new(device.clone())),
            plan_strategy: Arc::new(PlanStrategy::new()),
            ai_strategy: Arc::new(AiModelStrategy::new(device.clone(), ai)),
            device,
            cache,
        }
    }

    pub fn cache(&self) -> Option<&SharedTaskCache> {
        self.cache.as_ref()
    }

    /// Get strategy by tier
    fn get_strategy(&self, tier: LocateTier) -> Arc<dyn Strategy> {
        match tier {
            LocateTier::UserExpectedPath => self.user_path_strategy.clone(),
            LocateTier::Cache => self.cached_path_strategy.clone(),
            LocateTier::Planning => self.plan_strategy.clone(),
            LocateTier::AiModel => self.ai_strategy.clone(),
        }
    }

    /// Record a freshly resolved element so the next run can skip the
    /// expensive tiers. Skipped silently when no xpath can be derived.
    async fn write_back(&self, params: &LocateParams, hit: &TierHit) -> Option<Vec<String>> {
        if hit.hit_by.is_cache() || !params.is_cacheable() {
            return None;
        }
        let cache = self.cache.as_ref()?;
        let prompt = params.prompt.as_ref()?;

        let xpaths = match self.device.derive_xpath(&hit.element).await {
            Ok(Some(xpaths)) => xpaths,
            Ok(None) => {
                debug!(prompt = %prompt, "no xpath derivable; not caching");
                return None;
            }
            Err(err) => {
                warn!(prompt = %prompt, error = %err, "xpath derivation failed; not caching");
                return None;
            }
        };
        let record = CacheRecord::locate(prompt.clone(), xpaths)?;
        let saved = record.xpaths().map(<[String]>::to_vec);
        if cache.save(record) {
            saved
        } else {
            None
        }
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve(
        &self,
        params: &LocateParams,
        round: &PlanRound,
    ) -> Result<LocateOutcome, LocatorError> {
        if params.prompt.is_none()
            && params.xpath.is_none()
            && params.id.is_none()
            && params.bbox.is_none()
        {
            return Err(LocatorError::InvalidRequest(
                "locate request carries no prompt, xpath, id or bbox".to_string(),
            ));
        }
        let target = params.describe();
        info!(target = %target, "Resolving element");

        // Every prompted request claims its occurrence, hit or not, so the
        // rank stays aligned with call order across runs.
        let cached = match (&self.cache, &params.prompt) {
            (Some(cache), Some(prompt)) => Some(cache.lookup(CacheKind::Locate, prompt)),
            _ => None,
        };
        let input = TierInput {
            params,
            round,
            cached: cached.as_ref(),
        };

        let mut last_error = None;
        for tier in LocateTier::fallback_chain() {
            debug!(tier = tier.name(), "Trying tier");
            let strategy = self.get_strategy(tier);

            match strategy.resolve(&input).await {
                Ok(Some(hit)) => {
                    info!(
                        target = %target,
                        tier = tier.name(),
                        element = %hit.element.id,
                        x = hit.element.center.x,
                        y = hit.element.center.y,
                        "Resolved element"
                    );
                    let cached_xpaths = self.write_back(params, &hit).await;
                    return Ok(LocateOutcome {
                        element: hit.element,
                        hit_by: hit.hit_by,
                        tier,
                        cached_xpaths,
                    });
                }
                Ok(None) => {
                    debug!(tier = tier.name(), "Tier produced no element");
                }
                Err(err) => {
                    warn!(tier = tier.name(), error = %err, "Tier failed");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err @ LocatorError::AiService(_)) => Err(err),
            _ => Err(LocatorError::ElementNotFound(target)),
        }
    }
}
