//! Output module for harvested datasets and reports
//!
//! This module handles:
//! - Writing one CSV per region session (final or partial)
//! - Merging exported CSVs into a single deduplicated dataset
//! - Printing harvest, checkpoint and merge summaries

mod csv_output;
pub mod merge;
pub mod report;

pub use csv_output::{CsvExporter, ExportKind, UTF8_BOM};
pub use merge::{CsvMerger, MergeError, MergeReport};
pub use report::{format_checkpoint, format_report, print_checkpoint, print_report};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
