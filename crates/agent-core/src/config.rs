//! Configuration for the instruction driver.

use action_primitives::DefaultWaitStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for `act`, `run_plans` and the query family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Planner calls allowed per `act` before giving up.
    /// Default: 10
    pub replanning_cycle_limit: u32,

    /// Settling after every device action.
    /// Default: idle wait + 300ms
    pub settle: DefaultWaitStrategy,

    /// Duration of a Sleep step that names none.
    /// Default: 3000
    pub default_sleep_ms: u64,

    /// `wait_for` deadline when the caller gives none.
    /// Default: 15000 (15 seconds)
    pub wait_for_timeout_ms: u64,

    /// Poll period of `wait_for`.
    /// Default: 3000
    pub wait_for_check_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            replanning_cycle_limit: 10,
            settle: DefaultWaitStrategy::default(),
            default_sleep_ms: 3_000,
            wait_for_timeout_ms: 15_000,
            wait_for_check_interval_ms: 3_000,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a minimal config for testing: no settling, short waits.
    pub fn minimal() -> Self {
        Self {
            replanning_cycle_limit: 3,
            settle: DefaultWaitStrategy::none(),
            default_sleep_ms: 10,
            wait_for_timeout_ms: 500,
            wait_for_check_interval_ms: 100,
        }
    }

    /// Create a config optimized for fast execution.
    pub fn fast() -> Self {
        Self {
            replanning_cycle_limit: 5,
            settle: DefaultWaitStrategy {
                wait_for_idle: true,
                min_delay_ms: 100,
            },
            default_sleep_ms: 1_000,
            wait_for_timeout_ms: 5_000,
            wait_for_check_interval_ms: 1_000,
        }
    }

    pub fn with_replanning_cycle_limit(mut self, limit: u32) -> Self {
        self.replanning_cycle_limit = limit;
        self
    }

    pub fn with_settle(mut self, settle: DefaultWaitStrategy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_default_sleep_ms(mut self, ms: u64) -> Self {
        self.default_sleep_ms = ms;
        self
    }

    pub fn with_wait_for(mut self, timeout_ms: u64, check_interval_ms: u64) -> Self {
        self.wait_for_timeout_ms = timeout_ms;
        self.wait_for_check_interval_ms = check_interval_ms;
        self
    }
}
