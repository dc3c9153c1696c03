//! config.rs — tunables for one guidance session

use std::time::Duration;

use crate::source::WatchOptions;

#[derive(Debug, Clone)]
pub struct GuidanceConfig {
    /// EMA smoothing factor, 0..=0.95 (default 0.5)
    pub smoothing_factor: f64,
    /// Half-width of the presentation bar, ± meters (default 15)
    pub visual_range_m: f64,
    /// Feed request parameters
    pub watch: WatchOptions,
    /// First retry delay after a transient feed error (default 3 s)
    pub retry_base: Duration,
    /// Growth applied per consecutive failure (default ×1.5)
    pub retry_growth: f64,
    /// Ceiling for the retry delay (default 30 s)
    pub retry_max: Duration,
    /// Silence on an Active stream that triggers a forced restart (15 s)
    pub watchdog_stall: Duration,
    /// How often the watchdog looks (5 s)
    pub watchdog_poll: Duration,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.5,
            visual_range_m: 15.0,
            watch: WatchOptions::default(),
            retry_base: Duration::from_millis(3000),
            retry_growth: 1.5,
            retry_max: Duration::from_millis(30_000),
            watchdog_stall: Duration::from_secs(15),
            watchdog_poll: Duration::from_secs(5),
        }
    }
}
