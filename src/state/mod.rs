//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `PageState`: Classification of the live results page (normal, end, blocked, redirected)
//! - `RegionSession`: Per-region counters and accumulated records
//! - `HarvestPhase`: States of the harvest state machine

mod page_state;
mod session;

// Re-export main types
pub use page_state::PageState;
pub use session::{AbortReason, DoneReason, HarvestPhase, RegionSession, Resume};
