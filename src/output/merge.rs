//! Consolidation of exported CSV datasets
//!
//! Reads every CSV under a directory, tolerating mixed encodings, delimiters
//! and header spellings, and writes a single deduplicated dataset.

use crate::browser::collapse_whitespace;
use crate::config::MergeConfig;
use crate::output::csv_output::UTF8_BOM;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while merging
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("No CSV files found in {0}")]
    NoInput(String),

    #[error("None of the {0} CSV files could be read")]
    NothingReadable(usize),

    #[error("{0} has no header row")]
    EmptyFile(PathBuf),

    #[error("Invalid canonical header pattern '{pattern}': {message}")]
    InvalidRule { pattern: String, message: String },

    #[error("Invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of a finished merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub files_read: usize,
    pub files_skipped: Vec<PathBuf>,
}

/// An in-memory table with string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Merges CSV files according to [`MergeConfig`]
#[derive(Debug)]
pub struct CsvMerger {
    config: MergeConfig,
    canonical: Vec<(Regex, String)>,
}

impl CsvMerger {
    /// Compiles the canonical header table
    pub fn new(config: &MergeConfig) -> Result<Self, MergeError> {
        let canonical = config
            .canonical
            .iter()
            .map(|rule| {
                Regex::new(&format!("^(?:{})$", rule.pattern))
                    .map(|regex| (regex, rule.column.clone()))
                    .map_err(|e| MergeError::InvalidRule {
                        pattern: rule.pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config: config.clone(),
            canonical,
        })
    }

    /// Runs the merge and writes the output file
    ///
    /// # Returns
    ///
    /// * `Ok(MergeReport)` - Shape of the written dataset
    /// * `Err(MergeError)` - No input was found or none could be read, or the
    ///   output could not be written
    pub fn merge(&self) -> Result<MergeReport, MergeError> {
        let files = self.discover()?;
        if files.is_empty() {
            return Err(MergeError::NoInput(self.config.input_dir.clone()));
        }
        info!("Found {} CSV files in {}", files.len(), self.config.input_dir);

        let mut tables = Vec::new();
        let mut skipped = Vec::new();

        for path in &files {
            match self.read_table(path) {
                Ok(table) => {
                    let table = drop_empty_columns(self.canonicalize(table));
                    debug!(
                        "Read {}: {} rows, {} columns",
                        path.display(),
                        table.rows.len(),
                        table.columns.len()
                    );
                    tables.push(table);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(path.clone());
                }
            }
        }

        if tables.is_empty() {
            return Err(MergeError::NothingReadable(files.len()));
        }

        let files_read = tables.len();
        let merged = concat(tables);
        let merged = self.order_columns(merged);
        let mut merged = deduplicate(merged);
        for row in &mut merged.rows {
            for cell in row.iter_mut() {
                *cell = collapse_whitespace(cell);
            }
        }

        let output_path = PathBuf::from(&self.config.output_path);
        write_table(&output_path, &merged)?;

        info!(
            "Merge complete: {} | rows={} | columns={}",
            output_path.display(),
            merged.rows.len(),
            merged.columns.len()
        );

        Ok(MergeReport {
            output_path,
            rows: merged.rows.len(),
            columns: merged.columns.len(),
            files_read,
            files_skipped: skipped,
        })
    }

    /// Sorted `*.csv` files under the input directory, excluding the output
    fn discover(&self) -> Result<Vec<PathBuf>, MergeError> {
        let dir = self.config.input_dir.trim_end_matches('/');
        let pattern = if self.config.recursive {
            format!("{}/**/*.csv", dir)
        } else {
            format!("{}/*.csv", dir)
        };

        let output = Path::new(&self.config.output_path);
        let mut files: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Cannot inspect {}: {}", e.path().display(), e);
                    None
                }
            })
            .filter(|path| path.is_file() && path.as_path() != output)
            .collect();

        files.sort();
        Ok(files)
    }

    /// Reads one file, trying `,` first and `;` when `,` yields too many columns
    fn read_table(&self, path: &Path) -> Result<Table, MergeError> {
        let text = decode(&fs::read(path)?);

        let mut table = parse_delimited(&text, b',')?;
        if table.columns.len() > self.config.too_many_columns {
            match parse_delimited(&text, b';') {
                Ok(alt) if alt.columns.len() < table.columns.len() => {
                    debug!(
                        "{} parsed with ';' ({} columns instead of {})",
                        path.display(),
                        alt.columns.len(),
                        table.columns.len()
                    );
                    table = alt;
                }
                _ => {}
            }
        }

        if table.columns.is_empty() {
            return Err(MergeError::EmptyFile(path.to_path_buf()));
        }
        Ok(table)
    }

    /// Maps a raw header onto the canonical vocabulary
    pub fn canonical_header(&self, raw: &str) -> String {
        let normalized = normalize_header(raw);
        self.canonical
            .iter()
            .find(|(regex, _)| regex.is_match(&normalized))
            .map(|(_, column)| column.clone())
            .unwrap_or(normalized)
    }

    /// Renames columns; columns that end up with the same name are folded
    /// into the first one, which keeps its value unless it is empty
    fn canonicalize(&self, table: Table) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut target = Vec::with_capacity(table.columns.len());

        for raw in &table.columns {
            let name = self.canonical_header(raw);
            match columns.iter().position(|c| *c == name) {
                Some(index) => target.push(index),
                None => {
                    target.push(columns.len());
                    columns.push(name);
                }
            }
        }

        let rows = table
            .rows
            .into_iter()
            .map(|row| {
                let mut out = vec![String::new(); columns.len()];
                for (cell, &index) in row.into_iter().zip(&target) {
                    if is_missing(&out[index]) {
                        out[index] = cell;
                    }
                }
                out
            })
            .collect();

        Table { columns, rows }
    }

    /// Priority columns first, in their configured order, then the rest
    fn order_columns(&self, table: Table) -> Table {
        let mut order: Vec<usize> = self
            .config
            .priority_columns
            .iter()
            .filter_map(|p| table.columns.iter().position(|c| c == p))
            .collect();
        for index in 0..table.columns.len() {
            if !order.contains(&index) {
                order.push(index);
            }
        }

        let columns = order.iter().map(|&i| table.columns[i].clone()).collect();
        let rows = table
            .rows
            .into_iter()
            .map(|row| order.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Table { columns, rows }
    }
}

/// UTF-8 (BOM stripped) when valid, Latin-1 otherwise
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Parses delimited text; rows longer than the header are skipped, shorter
/// rows are padded
fn parse_delimited(text: &str, delimiter: u8) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("unnamed_{}", i)
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(record) if record.len() <= columns.len() => {
                let mut row: Vec<String> = record.iter().map(str::to_string).collect();
                row.resize(columns.len(), String::new());
                rows.push(row);
            }
            Ok(_) => debug!("Skipping row {}: too many fields", line + 2),
            Err(e) => debug!("Skipping row {}: {}", line + 2, e),
        }
    }

    if columns.len() == 1 && columns[0] == "unnamed_0" && rows.is_empty() {
        return Ok(Table::default());
    }

    Ok(Table { columns, rows })
}

/// Folds accented Latin letters to ASCII and drops combining marks
pub fn strip_accents(s: &str) -> String {
    s.chars()
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' | 'ª' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ý' | 'ÿ' => 'y',
            'Ý' => 'Y',
            other => other,
        })
        .collect()
}

/// Accent-free, trimmed, lowercase, single-spaced, without colons
pub fn normalize_header(raw: &str) -> String {
    collapse_whitespace(&strip_accents(raw).to_lowercase())
        .replace(" :", "")
        .replace(':', "")
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell == "nan" || cell == "None"
}

fn drop_empty_columns(table: Table) -> Table {
    let keep: Vec<usize> = (0..table.columns.len())
        .filter(|&i| table.rows.iter().any(|row| !is_missing(&row[i])))
        .collect();

    let columns = keep.iter().map(|&i| table.columns[i].clone()).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Table { columns, rows }
}

/// Stacks tables over the union of their columns, in first-seen order;
/// missing markers become empty cells
fn concat(tables: Vec<Table>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::new();

    for table in tables {
        let target: Vec<usize> = table
            .columns
            .iter()
            .map(|name| {
                *index.entry(name.clone()).or_insert_with(|| {
                    columns.push(name.clone());
                    columns.len() - 1
                })
            })
            .collect();

        for row in table.rows {
            let mut out = vec![String::new(); columns.len()];
            for (cell, &i) in row.into_iter().zip(&target) {
                if !is_missing(&cell) {
                    out[i] = cell;
                }
            }
            rows.push(out);
        }
    }

    for row in &mut rows {
        row.resize(columns.len(), String::new());
    }

    Table { columns, rows }
}

/// Keeps the first row per key: (registration_id, region), else
/// (name, region), else the whole row
fn deduplicate(table: Table) -> Table {
    let position = |name: &str| table.columns.iter().position(|c| c == name);
    let key_columns: Option<Vec<usize>> = match (
        position("registration_id"),
        position("name"),
        position("region"),
    ) {
        (Some(id), _, Some(region)) => Some(vec![id, region]),
        (None, Some(name), Some(region)) => Some(vec![name, region]),
        _ => None,
    };

    let mut seen = HashSet::new();
    let before = table.rows.len();
    let rows: Vec<Vec<String>> = table
        .rows
        .into_iter()
        .filter(|row| {
            let key: Vec<String> = match &key_columns {
                Some(columns) => columns.iter().map(|&i| row[i].clone()).collect(),
                None => row.clone(),
            };
            seen.insert(key)
        })
        .collect();

    if rows.len() < before {
        info!("Dropped {} duplicate rows", before - rows.len());
    }

    Table {
        columns: table.columns,
        rows,
    }
}

fn write_table(path: &Path, table: &Table) -> Result<(), MergeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path) -> MergeConfig {
        MergeConfig {
            input_dir: dir.join("in").to_string_lossy().into_owned(),
            output_path: dir.join("out").join("merged.csv").to_string_lossy().into_owned(),
            ..MergeConfig::default()
        }
    }

    fn write_input(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join("in").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn read_output(report: &MergeReport) -> (Vec<String>, Vec<Vec<String>>) {
        let bytes = fs::read(&report.output_path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let header = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Situação : "), "situacao");
        assert_eq!(normalize_header("Nome   Completo:"), "nome completo");
        assert_eq!(normalize_header("ÁREA DE ATUAÇÃO"), "area de atuacao");
    }

    #[test]
    fn test_canonical_header_is_full_match() {
        let dir = TempDir::new().unwrap();
        let merger = CsvMerger::new(&config(dir.path())).unwrap();

        assert_eq!(merger.canonical_header("Nome Completo"), "name");
        assert_eq!(merger.canonical_header("CRM/UF"), "registration_id");
        assert_eq!(merger.canonical_header("Situação"), "status");
        assert_eq!(merger.canonical_header("UF"), "region");
        // partial matches are left alone
        assert_eq!(merger.canonical_header("nome do pai"), "nome do pai");
    }

    #[test]
    fn test_semicolon_heuristic() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.too_many_columns = 3;
        write_input(
            dir.path(),
            "a.csv",
            "nome;endereco, numero, bairro, cidade\nANA;Rua A, 10, Centro, Boa Vista\n".as_bytes(),
        );

        let report = CsvMerger::new(&cfg).unwrap().merge().unwrap();
        let (header, rows) = read_output(&report);

        assert_eq!(header.len(), 2);
        assert_eq!(rows[0][0], "ANA");
        assert_eq!(rows[0][1], "Rua A, 10, Centro, Boa Vista");
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = TempDir::new().unwrap();
        write_input(dir.path(), "a.csv", b"Nome,Situa\xe7\xe3o\nJO\xc3O,Regular\n");

        let report = CsvMerger::new(&config(dir.path())).unwrap().merge().unwrap();
        let (header, rows) = read_output(&report);

        assert_eq!(header, vec!["name", "status"]);
        assert_eq!(rows[0][0], "JO\u{c3}O");
    }

    #[test]
    fn test_union_priority_dedup_and_cleanup() {
        let dir = TempDir::new().unwrap();
        write_input(
            dir.path(),
            "a.csv",
            "\u{feff}cidade,CRM,UF,Nome,vazia\nBoa Vista,1,RR,ANA  MARIA,\nBoa Vista,2,RR,BIA,\n"
                .as_bytes(),
        );
        write_input(
            dir.path(),
            "sub/b.csv",
            "Nome,CRM,UF,Email\nANA DUPLICADA,1,RR,a@x.org\nCAIO,1,AM,c@x.org\n".as_bytes(),
        );

        let report = CsvMerger::new(&config(dir.path())).unwrap().merge().unwrap();
        assert_eq!(report.files_read, 2);
        assert_eq!(report.rows, 3);

        let (header, rows) = read_output(&report);
        assert_eq!(header, vec!["name", "registration_id", "region", "city", "email"]);
        assert_eq!(rows[0], vec!["ANA MARIA", "1", "RR", "Boa Vista", ""]);
        assert_eq!(rows[2], vec!["CAIO", "1", "AM", "", "c@x.org"]);
    }

    #[test]
    fn test_non_recursive_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.recursive = false;
        write_input(dir.path(), "a.csv", b"nome,uf\nANA,RR\n");
        write_input(dir.path(), "sub/b.csv", b"nome,uf\nBIA,RR\n");

        let report = CsvMerger::new(&cfg).unwrap().merge().unwrap();
        assert_eq!(report.rows, 1);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_input(dir.path(), "a.csv", b"");
        write_input(dir.path(), "b.csv", b"nome,uf\nANA,RR\n");

        let report = CsvMerger::new(&config(dir.path())).unwrap().merge().unwrap();
        assert_eq!(report.files_read, 1);
        assert_eq!(report.files_skipped.len(), 1);
    }

    #[test]
    fn test_errors_without_usable_input() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("in")).unwrap();
        let merger = CsvMerger::new(&config(dir.path())).unwrap();
        assert!(matches!(merger.merge(), Err(MergeError::NoInput(_))));

        write_input(dir.path(), "a.csv", b"");
        assert!(matches!(merger.merge(), Err(MergeError::NothingReadable(1))));
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.canonical.push(crate::config::CanonicalRule {
            pattern: "(".to_string(),
            column: "x".to_string(),
        });
        assert!(matches!(
            CsvMerger::new(&cfg),
            Err(MergeError::InvalidRule { .. })
        ));
    }
}
