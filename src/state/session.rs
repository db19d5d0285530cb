//! Region session state and harvest phases
//!
//! The orchestrator threads one [`RegionSession`] through its state machine and
//! mutates it once per transition. Nothing here performs I/O.

use crate::record::Record;
use std::fmt;

/// Why a session finished normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The end-of-results marker was reached
    EndOfResults,
    /// The configured page limit was extracted
    PageLimit,
}

/// Why a session was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Consecutive recovery attempts exceeded the cap
    RecoveryExhausted,
    /// Too many consecutive empty pages without a block indicator
    LikelyBlocked,
    /// The interrupt flag was raised
    Interrupted,
}

/// The phase a recovery resumes into once the page is usable again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Search,
    Paging,
    Extract,
    Advance,
}

impl Resume {
    /// The phase to enter after a successful recovery
    pub fn phase(self) -> HarvestPhase {
        match self {
            Self::Search => HarvestPhase::Searching,
            Self::Paging => HarvestPhase::Paging,
            Self::Extract => HarvestPhase::Extracting,
            Self::Advance => HarvestPhase::Advancing,
        }
    }
}

/// States of the harvest state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Starting,
    Searching,
    /// Hopping from page 1 to the resume page
    Paging,
    Extracting,
    Advancing,
    Recovering { resume: Resume },
    Done(DoneReason),
    Aborted(AbortReason),
}

impl HarvestPhase {
    /// Returns true once the session has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Aborted(_))
    }

    /// Short label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Searching => "searching",
            Self::Paging => "paging",
            Self::Extracting => "extracting",
            Self::Advancing => "advancing",
            Self::Recovering { .. } => "recovering",
            Self::Done(_) => "done",
            Self::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recovering { resume } => write!(f, "recovering (then {:?})", resume),
            Self::Done(reason) => write!(f, "done ({:?})", reason),
            Self::Aborted(reason) => write!(f, "aborted ({:?})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Mutable progress of one region harvest
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSession {
    pub region: String,
    pub records: Vec<Record>,

    /// Page the browser is on (1-based; 0 before the search)
    pub current_page: u32,

    /// Last page whose records were accepted (0 = none)
    pub last_completed_page: u32,

    /// Page the session must reach before extracting (resume target)
    pub start_page: u32,

    pub consecutive_failures: u32,
    pub consecutive_empty: u32,

    /// Consecutive failed recovery attempts
    pub recovery_attempts: u32,

    /// Consecutive searches or page moves that never reached a new page
    pub navigation_failures: u32,

    /// Card reads that failed since the last completed page
    pub extraction_failures: u32,

    pub pages_visited: u32,
    pub recoveries: u32,
}

impl RegionSession {
    /// Creates a fresh session starting at page 1
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            records: Vec::new(),
            current_page: 0,
            last_completed_page: 0,
            start_page: 1,
            consecutive_failures: 0,
            consecutive_empty: 0,
            recovery_attempts: 0,
            navigation_failures: 0,
            extraction_failures: 0,
            pages_visited: 0,
            recoveries: 0,
        }
    }

    /// Restores a session from checkpointed records and the last completed page
    pub fn resumed(region: &str, records: Vec<Record>, last_completed_page: u32) -> Self {
        Self {
            records,
            last_completed_page,
            start_page: last_completed_page + 1,
            ..Self::new(region)
        }
    }

    /// Accepts the records of the current page
    ///
    /// Resets the failure and empty-page counters and marks the page completed.
    pub fn complete_page(&mut self, records: Vec<Record>) -> usize {
        let count = records.len();
        self.records.extend(records);
        self.last_completed_page = self.current_page;
        self.consecutive_failures = 0;
        self.consecutive_empty = 0;
        self.extraction_failures = 0;
        count
    }

    /// Counts an empty but unblocked page; returns the consecutive empty count
    pub fn record_empty_page(&mut self) -> u32 {
        self.consecutive_empty += 1;
        self.consecutive_failures += 1;
        self.consecutive_empty
    }

    /// Counts a failed navigation, block or recovery
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Counts a failed recovery attempt; returns the consecutive attempt count
    pub fn record_failed_recovery(&mut self) -> u32 {
        self.recovery_attempts += 1;
        self.consecutive_failures += 1;
        self.recovery_attempts
    }

    /// Clears the recovery counter after a successful recovery
    pub fn record_recovery(&mut self) {
        self.recovery_attempts = 0;
        self.recoveries += 1;
    }

    /// Counts a search or page move that did not reach a new page; returns
    /// the consecutive count
    pub fn record_navigation_failure(&mut self) -> u32 {
        self.navigation_failures += 1;
        self.consecutive_failures += 1;
        self.navigation_failures
    }

    /// Counts a failed card read; returns the count since the last completed page
    ///
    /// A successful recovery does not reset it.
    pub fn record_extraction_failure(&mut self) -> u32 {
        self.extraction_failures += 1;
        self.consecutive_failures += 1;
        self.extraction_failures
    }

    /// Moves the session onto a newly loaded page
    pub fn enter_page(&mut self, page: u32) {
        self.current_page = page;
        self.pages_visited += 1;
        self.navigation_failures = 0;
    }

    /// Returns true when the session still has to hop to its start page
    pub fn needs_paging(&self) -> bool {
        self.current_page < self.start_page
    }
}
