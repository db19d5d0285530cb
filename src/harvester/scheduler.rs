//! Backoff scheduling between page visits
//!
//! Delays grow with the page index (a step table of bands) and with the number
//! of consecutive failures. `delay_for` is pure and monotone in both inputs;
//! the periodic rest break is layered on top by `pause_for`.

use crate::config::BackoffConfig;
use crate::harvester::jitter::Jitter;
use std::time::Duration;

/// Computes pacing delays for a region session
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    config: BackoffConfig,
}

impl BackoffScheduler {
    /// Creates a scheduler from the backoff policy
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Multiplier of the highest band the page has passed (1.0 below all bands)
    pub fn band_multiplier(&self, page: u32) -> f64 {
        self.config
            .bands
            .iter()
            .filter(|band| page > band.after_page)
            .map(|band| band.multiplier)
            .fold(1.0, f64::max)
    }

    /// Delay before visiting `page` after `failures` consecutive failures
    ///
    /// `base × band(page) × (1 + factor × failures)`, never below the floor.
    pub fn delay_for(&self, page: u32, failures: u32) -> Duration {
        let failure_multiplier = 1.0 + self.config.failure_factor * f64::from(failures);
        let millis =
            self.config.base_delay_ms as f64 * self.band_multiplier(page) * failure_multiplier;
        let floor = self.config.floor_ms.max(1) as f64;

        Duration::from_secs_f64(millis.max(floor) / 1000.0)
    }

    /// Returns true on the pages where a longer rest is taken
    pub fn is_rest_page(&self, page: u32) -> bool {
        self.config.rest_interval > 0 && page > 0 && page % self.config.rest_interval == 0
    }

    /// `delay_for` plus the rest break on rest pages
    pub fn pause_for(&self, page: u32, failures: u32) -> Duration {
        let delay = self.delay_for(page, failures);
        if self.is_rest_page(page) {
            delay.mul_f64(self.config.rest_multiplier)
        } else {
            delay
        }
    }

    /// Draws the actual sleep for a delay: somewhere in `[delay, delay × spread]`
    pub fn sample(&self, delay: Duration, jitter: &mut dyn Jitter) -> Duration {
        jitter.between(delay, delay.mul_f64(self.config.spread))
    }
}
