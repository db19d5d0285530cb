//! Offline page driver over saved HTML
//!
//! Replays `page_<N>.html` files (or in-memory pages) with `scraper`:
//! - `navigate` loads page 1
//! - clicking an element whose text is a page number loads that page
//! - each load of a page consumes one of its versions; the last one sticks
//!
//! Used to re-extract saved result pages and to drive the harvester in tests.

use super::{collapse_whitespace, DriverError, DriverResult, Locator, PageDriver};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Shared record of the actions a [`SnapshotDriver`] performed
pub type ActionLog = Arc<Mutex<Vec<String>>>;

/// One version of a saved page
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotView {
    pub html: String,

    /// Location reported while this view is shown; defaults to the last
    /// navigated URL
    pub location: Option<String>,
}

impl SnapshotView {
    /// A view reporting the navigated location
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            location: None,
        }
    }

    /// Overrides the reported location
    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

/// Replays saved result pages
#[derive(Debug)]
pub struct SnapshotDriver {
    location: String,
    pages: BTreeMap<u32, VecDeque<SnapshotView>>,
    current: Option<(u32, SnapshotView)>,
    log: ActionLog,
    closed: bool,
}

impl SnapshotDriver {
    /// Creates a driver with no pages; `base_url` is the initial location
    pub fn new(base_url: &str) -> Self {
        Self {
            location: base_url.to_string(),
            pages: BTreeMap::new(),
            current: None,
            log: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Adds a page with a single version
    pub fn with_page(self, number: u32, html: impl Into<String>) -> Self {
        self.with_versions(number, vec![SnapshotView::html(html)])
    }

    /// Adds a page whose successive loads show successive versions
    pub fn with_versions(mut self, number: u32, versions: Vec<SnapshotView>) -> Self {
        self.pages.insert(number, versions.into_iter().collect());
        self
    }

    /// Loads every `page_<N>.html` in a directory
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the saved pages
    /// * `base_url` - Location reported for the pages
    ///
    /// # Returns
    ///
    /// * `Ok(SnapshotDriver)` - Driver over the pages found
    /// * `Err(DriverError)` - The directory could not be read or held no pages
    pub fn from_dir(dir: &Path, base_url: &str) -> DriverResult<Self> {
        let mut driver = Self::new(base_url);

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(number) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(page_number_from_file_name)
            else {
                continue;
            };

            let html = std::fs::read_to_string(&path)?;
            driver = driver.with_page(number, html);
        }

        if driver.pages.is_empty() {
            return Err(DriverError::Navigation(format!(
                "no page_<N>.html files in {}",
                dir.display()
            )));
        }

        Ok(driver)
    }

    /// Handle to the action log; stays valid after the driver is boxed
    pub fn action_log(&self) -> ActionLog {
        Arc::clone(&self.log)
    }

    /// Page number currently shown
    pub fn current_page(&self) -> Option<u32> {
        self.current.as_ref().map(|(n, _)| *n)
    }

    fn record(&self, action: String) {
        debug!("snapshot driver: {}", action);
        if let Ok(mut log) = self.log.lock() {
            log.push(action);
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::SessionClosed);
        }
        Ok(())
    }

    fn load(&mut self, number: u32) -> DriverResult<()> {
        let versions = self
            .pages
            .get_mut(&number)
            .ok_or_else(|| DriverError::Navigation(format!("no saved page {}", number)))?;

        let view = if versions.len() > 1 {
            versions.pop_front()
        } else {
            versions.front().cloned()
        }
        .ok_or_else(|| DriverError::Navigation(format!("saved page {} has no versions", number)))?;

        self.current = Some((number, view));
        self.record(format!("load:{}", number));
        Ok(())
    }

    fn html(&self) -> &str {
        self.current.as_ref().map_or("", |(_, view)| view.html.as_str())
    }

    fn matching_texts(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        select_texts(self.html(), locator)
    }

    fn require(&self, locator: &Locator) -> DriverResult<String> {
        self.matching_texts(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl PageDriver for SnapshotDriver {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.ensure_open()?;
        self.record(format!("navigate:{}", url));
        self.location = url.to_string();
        let first = self
            .pages
            .keys()
            .next()
            .copied()
            .ok_or_else(|| DriverError::Navigation("no saved pages".to_string()))?;
        self.load(first)
    }

    async fn reload(&mut self, _timeout: Duration) -> DriverResult<()> {
        self.ensure_open()?;
        self.record("reload".to_string());
        match self.current_page() {
            Some(number) => self.load(number),
            None => Err(DriverError::Navigation("nothing loaded".to_string())),
        }
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.ensure_open()?;
        let location = self
            .current
            .as_ref()
            .and_then(|(_, view)| view.location.clone())
            .unwrap_or_else(|| self.location.clone());
        Ok(location)
    }

    async fn content(&mut self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.html().to_string())
    }

    async fn count(&mut self, locator: &Locator) -> DriverResult<usize> {
        self.ensure_open()?;
        Ok(self.matching_texts(locator)?.len())
    }

    async fn text_contents(&mut self, locator: &Locator) -> DriverResult<Vec<String>> {
        self.ensure_open()?;
        self.matching_texts(locator)
    }

    async fn hover(&mut self, locator: &Locator) -> DriverResult<()> {
        self.ensure_open()?;
        self.require(locator)?;
        self.record(format!("hover:{}", locator));
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        self.ensure_open()?;
        let text = self.require(locator)?;
        self.record(format!("click:{}", locator));

        match collapse_whitespace(&text).parse::<u32>() {
            Ok(number) if self.pages.contains_key(&number) => self.load(number),
            _ => Ok(()),
        }
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> DriverResult<()> {
        self.ensure_open()?;
        if !has_option(self.html(), locator, value)? {
            return Err(DriverError::ElementNotFound(format!(
                "option '{}' in {}",
                value, locator
            )));
        }
        self.record(format!("select:{}={}", locator, value));
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        self.ensure_open()?;
        self.require(locator)?;
        self.record(format!("fill:{}={}", locator, text));
        Ok(())
    }

    async fn move_mouse(&mut self, x: i64, y: i64) -> DriverResult<()> {
        self.ensure_open()?;
        self.record(format!("mouse:{},{}", x, y));
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str, _args: Vec<Value>) -> DriverResult<Value> {
        Err(DriverError::Unsupported(
            "script evaluation on saved pages".to_string(),
        ))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.record("close".to_string());
        Ok(())
    }
}

/// Parses `page_<N>.html` into `N`
fn page_number_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix("page_")?
        .strip_suffix(".html")?
        .parse()
        .ok()
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector).map_err(|e| DriverError::InvalidSelector(format!("{}: {:?}", selector, e)))
}

/// Text of every element matching the locator
fn select_texts(html: &str, locator: &Locator) -> DriverResult<Vec<String>> {
    let selector = parse_selector(&locator.selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .filter(|text| locator.accepts_text(text))
        .collect())
}

/// Returns true if a matching `<select>` has an option with this value
fn has_option(html: &str, locator: &Locator, value: &str) -> DriverResult<bool> {
    let selector = parse_selector(&locator.selector)?;
    let option = parse_selector("option")?;
    let document = Html::parse_document(html);

    let found = document
        .select(&selector)
        .flat_map(|select| select.select(&option))
        .any(|opt| opt.value().attr("value") == Some(value));

    Ok(found)
}
