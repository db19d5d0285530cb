//! Page classification for the live results page
//!
//! A classification is recomputed on every check and never cached.

use std::fmt;

/// What the rendered results page currently shows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Result cards (or a legitimately empty area) on the expected page
    Normal,

    /// The result set is exhausted
    EndOfResults,

    /// A block indicator was found; carries the indicator or detection error
    Blocked(String),

    /// The browser left the search page; carries the actual location
    Redirected(String),
}

impl PageState {
    /// Returns true if the state prevents extraction and calls for recovery
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::Redirected(_))
    }

    /// Returns true if the page is usable
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Returns true if the result set is exhausted
    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfResults)
    }

    /// Short label for logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::EndOfResults => "end_of_results",
            Self::Blocked(_) => "blocked",
            Self::Redirected(_) => "redirected",
        }
    }

    /// The reason or location attached to a blocking state
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Blocked(reason) => Some(reason),
            Self::Redirected(location) => Some(location),
            _ => None,
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.as_str(), detail),
            None => f.write_str(self.as_str()),
        }
    }
}
