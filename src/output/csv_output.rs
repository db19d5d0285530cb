//! Per-region CSV export

use crate::output::OutputResult;
use crate::record::{Field, Record};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// UTF-8 byte order mark, so spreadsheet tools detect the encoding
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Whether a dataset is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// The session reached the end of the results or its page limit
    Final,
    /// The session was aborted
    Partial,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Final => "final",
            Self::Partial => "partial",
        }
    }
}

/// Writes region datasets into a directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
    prefix: String,
    bom: bool,
}

impl CsvExporter {
    pub fn new(dir: &Path, prefix: &str, bom: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            bom,
        }
    }

    /// `<prefix>_<REGION>_<YYYYmmdd_HHMMSS>_<kind>.csv`
    pub fn file_name(&self, region: &str, at: DateTime<Local>, kind: ExportKind) -> String {
        format!(
            "{}_{}_{}_{}.csv",
            self.prefix,
            region,
            at.format("%Y%m%d_%H%M%S"),
            kind.as_str()
        )
    }

    /// Writes one CSV for the region and returns its path
    ///
    /// The header is the field vocabulary; absent fields are empty cells.
    pub fn write(&self, region: &str, records: &[Record], kind: ExportKind) -> OutputResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(self.file_name(region, Local::now(), kind));

        let mut file = File::create(&path)?;
        if self.bom {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(Field::ALL.iter().map(Field::column))?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;

        info!(
            "Wrote {} records for {} to {}",
            records.len(),
            region,
            path.display()
        );
        Ok(path)
    }
}
