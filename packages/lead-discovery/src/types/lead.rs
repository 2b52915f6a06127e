//! Extracted fields and finished leads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::CandidateResult;
use super::configuration::SourceKind;

/// A heuristic result: either a value or an explicit "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unknown
    }
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Known(v) => Field::Known(f(v)),
            Field::Unknown => Field::Unknown,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

/// Kind of project a lead describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Hotel,
    Resort,
    MixedUse,
    Healthcare,
    Education,
    Residential,
    Office,
    Retail,
    Industrial,
    Infrastructure,
}

impl ProjectType {
    /// Lodging projects are the only ones with a meaningful room count.
    pub fn is_lodging(self) -> bool {
        matches!(self, ProjectType::Hotel | ProjectType::Resort)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectType::Hotel => "Hotel",
            ProjectType::Resort => "Resort",
            ProjectType::MixedUse => "Mixed-use",
            ProjectType::Healthcare => "Healthcare",
            ProjectType::Education => "Education",
            ProjectType::Residential => "Residential",
            ProjectType::Office => "Office",
            ProjectType::Retail => "Retail",
            ProjectType::Industrial => "Industrial",
            ProjectType::Infrastructure => "Infrastructure",
        }
    }
}

/// A currency amount found in text, normalized to whole units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub amount: f64,
    /// ISO currency code
    pub currency: String,
    /// The text the amount was read from
    pub raw: String,
}

/// Contact details found in text. At least one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.title.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// Everything the extractor produces for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFields {
    pub company: Field<String>,
    pub location: Field<String>,
    pub project_type: Field<ProjectType>,
    pub budget: Field<Budget>,
    pub room_count: Field<u32>,
    pub contact: Field<Contact>,
}

/// Per-field completeness of a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completeness {
    pub company: bool,
    pub location: bool,
    pub project_type: bool,
    pub budget: bool,
    pub room_count: bool,
    pub contact: bool,
}

impl Completeness {
    pub fn of(fields: &LeadFields) -> Self {
        Self {
            company: fields.company.is_known(),
            location: fields.location.is_known(),
            project_type: fields.project_type.is_known(),
            budget: fields.budget.is_known(),
            room_count: fields.room_count.is_known(),
            contact: fields.contact.is_known(),
        }
    }

    pub fn filled(&self) -> usize {
        [
            self.company,
            self.location,
            self.project_type,
            self.budget,
            self.room_count,
            self.contact,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// Extractor output, verifier input.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadDraft {
    pub candidate: CandidateResult,
    pub fields: LeadFields,
    pub description: String,
}

/// A finished, scored lead handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub title: String,
    pub url: String,
    pub source: SourceKind,
    pub verified_source: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub fields: LeadFields,
    pub description: String,
    /// 0-100
    pub confidence: u8,
    pub completeness: Completeness,
    /// Set when scoring failed and the lead was passed through unscored
    pub verification_note: Option<String>,
}
