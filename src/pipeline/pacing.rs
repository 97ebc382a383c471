//! Buffer thresholds that drive production speed.

use crate::config::PacingConfig;
use std::time::Duration;

/// Low/high water marks plus the pauses applied by the broadcast loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingPolicy {
    pub low_water_secs: f64,
    pub high_water_secs: f64,
    pub cool_down: Duration,
    pub retry_delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from(&PacingConfig::default())
    }
}

impl From<&PacingConfig> for PacingPolicy {
    fn from(config: &PacingConfig) -> Self {
        Self {
            low_water_secs: config.low_water_secs,
            high_water_secs: config.high_water_secs,
            cool_down: Duration::from_secs(config.cool_down_secs),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

impl PacingPolicy {
    /// Below the low-water mark the listener may hear silence soon.
    pub fn is_urgent(&self, buffer_health: f64) -> bool {
        buffer_health < self.low_water_secs
    }

    /// Pause to apply after scheduling, if the buffer is above high water.
    pub fn cool_down_for(&self, buffer_health: f64) -> Option<Duration> {
        (buffer_health > self.high_water_secs).then_some(self.cool_down)
    }
}
