//! Locate Resolver - tiered element resolution
//!
//! Resolves a step's target through a strict, cost-ordered chain:
//! user expected path, cache, plan-matched id/bbox, AI model. A fresh
//! (non-cache) result is written back to the task cache as xpaths so later
//! runs can skip the model call.

pub mod bridge;
pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use bridge::{text_matching_locator, AiLocator, FnAiLocator, NoAiLocator};
pub use errors::LocatorError;
pub use resolver::{DefaultElementResolver, ElementResolver};
pub use strategies::Strategy;
pub use types::{LocateOutcome, LocateTier, PlanRound, TierHit, TierInput};
