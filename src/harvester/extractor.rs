//! Field extraction from result-card text
//!
//! Each field has an ordered list of case-insensitive patterns; the first one
//! that matches supplies capture group 1, trimmed. Extraction never fails: a
//! field with no matching pattern is simply absent.

use crate::config::ExtractionConfig;
use crate::record::{Field, Record};
use crate::ConfigError;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// Built-in patterns, matching the labels of the registry portal
fn default_patterns(field: Field) -> &'static [&'static str] {
    match field {
        Field::Name => &[r"^\s*([^\n]+?)\s+CRM:"],
        Field::RegistrationId => &[r"CRM:\s*([^\s]+)"],
        Field::RegistrationDate => &[r"Data de Inscrição:\s*(\d{2}/\d{2}/\d{4})"],
        Field::Status => &[r"Situação:\s*([^\s]+)"],
        Field::Specialty => {
            &[r"Especialidades/Áreas de Atuação:[ \t]*([^\n]*?)(?:\s+Endereço|\n|$)"]
        }
        Field::GraduationInstitution => &[r"Instituição de Graduação:\s*([^\n]+)"],
        Field::GraduationYear => &[r"Ano de Formatura:\s*(\d{4})"],
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Applies the per-field pattern rules to card text
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rules: BTreeMap<Field, Vec<Regex>>,
    end_marker: String,
}

impl FieldExtractor {
    /// Creates an extractor with the built-in rules
    pub fn new(end_marker: &str) -> Self {
        let rules = Field::ALL
            .into_iter()
            .map(|field| {
                let regexes = default_patterns(field)
                    .iter()
                    .filter_map(|p| compile(p).ok())
                    .collect();
                (field, regexes)
            })
            .collect();

        Self {
            rules,
            end_marker: end_marker.to_string(),
        }
    }

    /// Creates an extractor whose rules are overridden per field by configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Pattern overrides keyed by column name
    /// * `end_marker` - Text marking a card as the end-of-results notice
    ///
    /// # Returns
    ///
    /// * `Ok(FieldExtractor)` - Extractor with the overrides applied
    /// * `Err(ConfigError)` - An override names an unknown field or fails to compile
    pub fn from_config(config: &ExtractionConfig, end_marker: &str) -> Result<Self, ConfigError> {
        let mut extractor = Self::new(end_marker);

        for (column, patterns) in &config.patterns {
            let field = Field::from_column(column).ok_or_else(|| {
                ConfigError::InvalidPattern(format!("unknown field '{}'", column))
            })?;

            let regexes = patterns
                .iter()
                .map(|p| {
                    compile(p).map_err(|e| {
                        ConfigError::InvalidPattern(format!("field '{}': {}", column, e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            extractor.rules.insert(field, regexes);
        }

        Ok(extractor)
    }

    /// Extracts one record from raw card text
    pub fn extract(&self, raw: &str) -> Record {
        let mut record = Record::default();

        for (field, regexes) in &self.rules {
            let value = regexes.iter().find_map(|regex| {
                regex
                    .captures(raw)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
            });
            record.set(*field, value);
        }

        record
    }

    /// Extracts the records of a page, dropping end-of-results cards and
    /// cards that identify no one
    pub fn extract_cards<S: AsRef<str>>(&self, cards: &[S]) -> Vec<Record> {
        cards
            .iter()
            .map(AsRef::as_ref)
            .filter(|text| !text.contains(self.end_marker.as_str()))
            .map(|text| self.extract(text))
            .filter(Record::is_valid)
            .collect()
    }
}
