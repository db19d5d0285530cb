//! URL handling module for Registry-Harvester
//!
//! Location normalization and matching used to detect when the browser has been
//! sent away from the search page.

mod normalize;

pub use normalize::{matches_expected_location, normalize_location};
