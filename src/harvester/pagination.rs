//! Moving between result pages
//!
//! The portal renders page links inside a pagination bar and swaps the result
//! cards in place when one is clicked. A move counts as landed only once the
//! card text differs from what was shown before the click.

use crate::browser::{Locator, PageDriver};
use crate::config::{PacingConfig, SiteConfig, TimeoutConfig};
use crate::harvester::classifier::PageClassifier;
use crate::harvester::jitter::Jitter;
use crate::harvester::pacing;
use crate::state::PageState;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one attempt to move to the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// The next page loaded and looks normal
    Advanced,
    /// No numbered link or next control is present
    NoControl,
    /// The move did not produce a usable page
    Failed {
        /// The click happened and the cards changed, so the browser is now
        /// on the next page even though it is not usable
        landed: bool,
        reason: String,
    },
}

impl NavOutcome {
    fn failed(landed: bool, reason: impl Into<String>) -> Self {
        Self::Failed {
            landed,
            reason: reason.into(),
        }
    }
}

/// Clicks through the pagination bar
#[derive(Debug, Clone)]
pub struct Paginator {
    pagination_selector: String,
    next_control_texts: Vec<String>,
    results: Locator,
    refresh_timeout: Duration,
    poll_interval: Duration,
    hover_ms: (u64, u64),
    mouse_moves: bool,
}

impl Paginator {
    pub fn new(site: &SiteConfig, timeouts: &TimeoutConfig, pacing: &PacingConfig) -> Self {
        Self {
            pagination_selector: site.pagination_selector.clone(),
            next_control_texts: site.next_control_texts.clone(),
            results: Locator::css(&site.results_selector),
            refresh_timeout: Duration::from_millis(timeouts.page_refresh_ms),
            poll_interval: Duration::from_millis(timeouts.poll_interval_ms.max(1)),
            hover_ms: (pacing.hover_min_ms, pacing.hover_max_ms),
            mouse_moves: pacing.mouse_moves,
        }
    }

    /// Finds the control leading to `target`
    ///
    /// The numbered link wins; the generic next controls are the fallback.
    pub async fn find_control(
        &self,
        driver: &mut dyn PageDriver,
        target: u32,
    ) -> Option<Locator> {
        let numbered = Locator::css(&self.pagination_selector).with_text(&target.to_string());
        if matches!(driver.count(&numbered).await, Ok(n) if n > 0) {
            return Some(numbered);
        }

        for text in &self.next_control_texts {
            let control = Locator::css(&self.pagination_selector).with_text(text);
            if matches!(driver.count(&control).await, Ok(n) if n > 0) {
                debug!("Page link {} missing, using next control '{}'", target, text);
                return Some(control);
            }
        }

        None
    }

    /// Moves from `current` to `current + 1`
    pub async fn go_to_page(
        &self,
        driver: &mut dyn PageDriver,
        jitter: &mut dyn Jitter,
        classifier: &PageClassifier,
        current: u32,
    ) -> NavOutcome {
        let target = current + 1;

        match classifier.classify(driver).await {
            PageState::Normal => {}
            PageState::EndOfResults => return NavOutcome::NoControl,
            other => {
                return NavOutcome::failed(false, format!("page {} is {}", current, other));
            }
        }

        let Some(control) = self.find_control(driver, target).await else {
            debug!("No pagination control for page {}", target);
            return NavOutcome::NoControl;
        };

        let before = match driver.text_contents(&self.results).await {
            Ok(cards) => cards,
            Err(e) => return NavOutcome::failed(false, format!("reading cards: {}", e)),
        };

        if self.mouse_moves {
            pacing::wiggle(driver, jitter).await;
        }
        if let Err(e) = driver.hover(&control).await {
            debug!("Hover on {} failed: {}", control, e);
        }
        pacing::pause(jitter, self.hover_ms.0, self.hover_ms.1).await;

        if let Err(e) = driver.click(&control).await {
            warn!("Click on {} failed: {}", control, e);
            return NavOutcome::failed(false, format!("click failed: {}", e));
        }

        let refreshed = self.wait_for_refresh(driver, classifier, &before).await;
        if !refreshed {
            warn!(
                "Results did not refresh within {:?} after clicking {}",
                self.refresh_timeout, control
            );
            return NavOutcome::failed(false, "results did not refresh");
        }

        match classifier.classify(driver).await {
            PageState::Normal => {
                info!("Moved to page {}", target);
                NavOutcome::Advanced
            }
            other => NavOutcome::failed(true, format!("page {} is {}", target, other)),
        }
    }

    /// Polls until new cards are attached or the page stops looking normal
    ///
    /// An empty result container is still loading, not refreshed.
    async fn wait_for_refresh(
        &self,
        driver: &mut dyn PageDriver,
        classifier: &PageClassifier,
        before: &[String],
    ) -> bool {
        let deadline = tokio::time::Instant::now() + self.refresh_timeout;

        loop {
            if let Ok(cards) = driver.text_contents(&self.results).await {
                if !cards.is_empty() && cards.as_slice() != before {
                    return true;
                }
            }
            if !classifier.inspect(driver).await.is_normal() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
