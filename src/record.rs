//! Registry record model
//!
//! A [`Record`] maps the fixed field vocabulary of the registry to optional
//! values. `None` means the field was not found in the card; `Some("")` means it
//! was found but carried no text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed field vocabulary of a registry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    RegistrationId,
    RegistrationDate,
    Status,
    Specialty,
    GraduationInstitution,
    GraduationYear,
}

impl Field {
    /// All fields, in output column order
    pub const ALL: [Field; 7] = [
        Field::Name,
        Field::RegistrationId,
        Field::RegistrationDate,
        Field::Status,
        Field::Specialty,
        Field::GraduationInstitution,
        Field::GraduationYear,
    ];

    /// Column name used in CSV output and configuration keys
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::RegistrationId => "registration_id",
            Self::RegistrationDate => "registration_date",
            Self::Status => "status",
            Self::Specialty => "specialty",
            Self::GraduationInstitution => "graduation_institution",
            Self::GraduationYear => "graduation_year",
        }
    }

    /// Parses a column name back into a field
    pub fn from_column(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == s)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One physician entry extracted from a result card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: Option<String>,
    pub registration_id: Option<String>,
    pub registration_date: Option<String>,
    pub status: Option<String>,
    pub specialty: Option<String>,
    pub graduation_institution: Option<String>,
    pub graduation_year: Option<String>,
}

impl Record {
    /// Returns the value of a field, if present
    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Sets a field value
    pub fn set(&mut self, field: Field, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    /// A record is kept only when it identifies someone: a non-empty name or
    /// registration id
    pub fn is_valid(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.name) || present(&self.registration_id)
    }

    /// Returns the values in column order, absent fields as empty cells
    pub fn to_row(&self) -> Vec<&str> {
        Field::ALL
            .iter()
            .map(|f| self.get(*f).unwrap_or(""))
            .collect()
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Name => &self.name,
            Field::RegistrationId => &self.registration_id,
            Field::RegistrationDate => &self.registration_date,
            Field::Status => &self.status,
            Field::Specialty => &self.specialty,
            Field::GraduationInstitution => &self.graduation_institution,
            Field::GraduationYear => &self.graduation_year,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::RegistrationId => &mut self.registration_id,
            Field::RegistrationDate => &mut self.registration_date,
            Field::Status => &mut self.status,
            Field::Specialty => &mut self.specialty,
            Field::GraduationInstitution => &mut self.graduation_institution,
            Field::GraduationYear => &mut self.graduation_year,
        }
    }
}
