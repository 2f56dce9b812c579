//! Settling after device actions

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::DeviceInterface;

/// Waiting strategy run after every device action
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    async fn settle(&self, device: &dyn DeviceInterface);
}

/// Idle wait (when the device supports it) followed by a fixed delay so the
/// next screenshot reflects a stable UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultWaitStrategy {
    pub wait_for_idle: bool,

    /// Minimal settle delay (milliseconds)
    pub min_delay_ms: u64,
}

impl Default for DefaultWaitStrategy {
    fn default() -> Self {
        Self {
            wait_for_idle: true,
            min_delay_ms: 300,
        }
    }
}

impl DefaultWaitStrategy {
    pub fn none() -> Self {
        Self {
            wait_for_idle: false,
            min_delay_ms: 0,
        }
    }
}

#[async_trait]
impl WaitStrategy for DefaultWaitStrategy {
    async fn settle(&self, device: &dyn DeviceInterface) {
        if self.wait_for_idle && device.supports_idle_wait() {
            debug!(device = device.interface_type(), "waiting for device idle");
            if let Err(err) = device.wait_for_idle().await {
                warn!(error = %err, "idle wait failed; continuing");
            }
        }
        if self.min_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.min_delay_ms)).await;
        }
    }
}
