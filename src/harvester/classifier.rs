//! Page state classification
//!
//! Decides whether the live page shows results, the end of the result set, a
//! block, or a redirect away from the search page. The ordering lives in the
//! pure [`classify_snapshot`]; [`PageClassifier::classify`] only gathers the
//! inputs from the driver.

use crate::browser::{Locator, PageDriver};
use crate::config::SiteConfig;
use crate::state::PageState;
use crate::url::matches_expected_location;
use tracing::{debug, warn};

/// What the classifier looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Text of the result area
    pub result_text: String,
    /// Full page source
    pub content: String,
    /// Current location
    pub location: String,
}

/// Markers the classifier matches against
#[derive(Debug, Clone)]
pub struct PageClassifier {
    end_marker: String,
    block_indicators: Vec<String>,
    expected_location: String,
    result_area: Locator,
}

impl PageClassifier {
    /// Builds a classifier from the site settings
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            end_marker: site.end_marker.clone(),
            block_indicators: site
                .block_indicators
                .iter()
                .map(|indicator| indicator.to_lowercase())
                .collect(),
            expected_location: site.search_url.clone(),
            result_area: Locator::css(&site.result_area_selector),
        }
    }

    /// Classifies a gathered snapshot; first match wins
    ///
    /// 1. end marker in the result area → `EndOfResults`
    /// 2. block indicator in the page (case-insensitive) → `Blocked`
    /// 3. location off the search page → `Redirected`
    /// 4. otherwise `Normal`
    pub fn classify_snapshot(&self, snapshot: &PageSnapshot) -> PageState {
        if snapshot.result_text.contains(&self.end_marker) {
            return PageState::EndOfResults;
        }

        let content = snapshot.content.to_lowercase();
        if let Some(indicator) = self
            .block_indicators
            .iter()
            .find(|indicator| content.contains(indicator.as_str()))
        {
            return PageState::Blocked(indicator.clone());
        }

        if !matches_expected_location(&snapshot.location, &self.expected_location) {
            return PageState::Redirected(snapshot.location.clone());
        }

        PageState::Normal
    }

    /// Inspects the live page without logging
    ///
    /// A driver failure while inspecting is reported as a block.
    pub async fn inspect(&self, driver: &mut dyn PageDriver) -> PageState {
        match self.snapshot(driver).await {
            Ok(snapshot) => self.classify_snapshot(&snapshot),
            Err(e) => PageState::Blocked(format!("detection error: {}", e)),
        }
    }

    /// Inspects the live page and logs anything abnormal
    pub async fn classify(&self, driver: &mut dyn PageDriver) -> PageState {
        let state = self.inspect(driver).await;

        match &state {
            PageState::Blocked(reason) => warn!("Block indicator detected: {}", reason),
            PageState::Redirected(location) => warn!("Redirected to {}", location),
            other => debug!("Page classified as {}", other),
        }

        state
    }

    async fn snapshot(
        &self,
        driver: &mut dyn PageDriver,
    ) -> crate::browser::DriverResult<PageSnapshot> {
        let result_text = driver.text_contents(&self.result_area).await?.join("\n");
        let content = driver.content().await?;
        let location = driver.current_url().await?;

        Ok(PageSnapshot {
            result_text,
            content,
            location,
        })
    }
}
