//! Browser driver abstraction
//!
//! The harvester talks to the rendering engine only through [`PageDriver`].
//! Two implementations ship with the crate:
//! - [`WebDriverSession`]: a live browser over the W3C WebDriver HTTP protocol
//! - [`SnapshotDriver`]: offline replay of saved HTML pages

mod snapshot;
mod webdriver;

pub use snapshot::{ActionLog, SnapshotDriver, SnapshotView};
pub use webdriver::WebDriverSession;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Interval between polls in [`PageDriver::wait_for`]
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by page drivers
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("WebDriver error {error}: {message}")]
    Protocol { error: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Operation not supported by this driver: {0}")]
    Unsupported(String),

    #[error("Browser session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Addresses page elements: a CSS selector plus an optional exact-text filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub selector: String,

    /// Keep only elements whose trimmed text equals this
    pub text: Option<String>,
}

impl Locator {
    /// Locator matching every element for a CSS selector
    pub fn css(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            text: None,
        }
    }

    /// Restricts the locator to elements whose text is exactly `text`
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Returns true if an element's text passes the text filter
    pub fn accepts_text(&self, element_text: &str) -> bool {
        match &self.text {
            Some(wanted) => collapse_whitespace(element_text) == collapse_whitespace(wanted),
            None => true,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} [text=\"{}\"]", self.selector, text),
            None => f.write_str(&self.selector),
        }
    }
}

/// Capability interface to a rendered page
///
/// Methods take `&mut self`: one driver is owned by one harvest and used
/// strictly sequentially.
#[async_trait]
pub trait PageDriver: Send {
    /// Loads `url`, failing with [`DriverError::Timeout`] after `timeout`
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Reloads the current page
    async fn reload(&mut self, timeout: Duration) -> DriverResult<()>;

    /// The current location
    async fn current_url(&mut self) -> DriverResult<String>;

    /// The full page source
    async fn content(&mut self) -> DriverResult<String>;

    /// Number of elements matching the locator
    async fn count(&mut self, locator: &Locator) -> DriverResult<usize>;

    /// Text of every element matching the locator, in document order
    async fn text_contents(&mut self, locator: &Locator) -> DriverResult<Vec<String>>;

    /// Moves the pointer over the first matching element
    async fn hover(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Clicks the first matching element
    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Selects the option with the given value in the first matching `<select>`
    async fn select_option(&mut self, locator: &Locator, value: &str) -> DriverResult<()>;

    /// Replaces the value of the first matching input
    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()>;

    /// Moves the pointer to viewport coordinates
    async fn move_mouse(&mut self, x: i64, y: i64) -> DriverResult<()>;

    /// Evaluates a script against the live DOM and returns its result
    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> DriverResult<Value>;

    /// Polls until at least one element matches, or fails after `timeout`
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(locator).await? > 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::Timeout(format!(
                    "waiting {:?} for {}",
                    timeout, locator
                )));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Ends the browser session
    async fn close(&mut self) -> DriverResult<()>;
}

/// Trims and collapses internal whitespace runs to single spaces
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_text_filter() {
        let any = Locator::css("#paginacao a");
        assert!(any.accepts_text("7"));

        let two = Locator::css("#paginacao a").with_text("2");
        assert!(two.accepts_text(" 2 "));
        assert!(two.accepts_text("\n2\n"));
        assert!(!two.accepts_text("12"));
        assert!(!two.accepts_text("2 >"));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::css("a").to_string(), "a");
        assert_eq!(
            Locator::css("a").with_text("Próxima").to_string(),
            "a [text=\"Próxima\"]"
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }
}
