//! Structured representation of a free-text insurance query.
//!
//! Every attribute is an [`Attr`]: either a validated value or an explicit
//! [`Unresolved`] marker saying why no value could be produced. There is no
//! default value that could be mistaken for extracted data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Why an attribute has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unresolved {
    /// Nothing in the text mentioned the attribute.
    Missing,
    /// The text mentioned several conflicting values.
    Ambiguous,
    /// A value was found but failed validation (e.g. age 150).
    OutOfRange,
}

impl Unresolved {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Ambiguous => "ambiguous",
            Self::OutOfRange => "out of range",
        }
    }
}

/// An extracted attribute: a validated value or an unresolved marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attr<T> {
    Resolved(T),
    Unresolved(Unresolved),
}

impl<T> Default for Attr<T> {
    fn default() -> Self {
        Self::Unresolved(Unresolved::Missing)
    }
}

impl<T> Attr<T> {
    pub fn missing() -> Self {
        Self::Unresolved(Unresolved::Missing)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The unresolved reason, or `None` when a value is present.
    pub fn unresolved(&self) -> Option<Unresolved> {
        match self {
            Self::Resolved(_) => None,
            Self::Unresolved(reason) => Some(*reason),
        }
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Resolved(v),
            None => Self::missing(),
        }
    }
}

/// Canonical gender values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "other")]
    Other,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;

    /// Parse a canonical gender name (`M`, `F`, `other`, `unknown`).
    ///
    /// Aliases such as "man" or "woman" live in the synonym table, not here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Ok(Self::Male),
            "f" | "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            "unknown" => Ok(Self::Unknown),
            other => Err(CoreError::UnknownGender(other.to_string())),
        }
    }
}

/// Names of the extractable attributes, used to report unresolved fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryField {
    Age,
    Gender,
    Procedure,
    Location,
    PolicyDuration,
}

impl QueryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Procedure => "procedure",
            Self::Location => "location",
            Self::PolicyDuration => "policy duration",
        }
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured form of one free-text query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub raw_text: String,
    pub age: Attr<u32>,
    pub gender: Attr<Gender>,
    pub procedure: Attr<String>,
    pub location: Attr<String>,
    pub policy_duration_months: Attr<u32>,
}

impl StructuredQuery {
    /// A query with every attribute marked missing.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            age: Attr::missing(),
            gender: Attr::missing(),
            procedure: Attr::missing(),
            location: Attr::missing(),
            policy_duration_months: Attr::missing(),
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Attr::Resolved(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Attr::Resolved(gender);
        self
    }

    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = Attr::Resolved(procedure.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Attr::Resolved(location.into());
        self
    }

    pub fn with_policy_duration_months(mut self, months: u32) -> Self {
        self.policy_duration_months = Attr::Resolved(months);
        self
    }

    /// Unresolved reason for a single field, `None` when it has a value.
    pub fn unresolved(&self, field: QueryField) -> Option<Unresolved> {
        match field {
            QueryField::Age => self.age.unresolved(),
            QueryField::Gender => self.gender.unresolved(),
            QueryField::Procedure => self.procedure.unresolved(),
            QueryField::Location => self.location.unresolved(),
            QueryField::PolicyDuration => self.policy_duration_months.unresolved(),
        }
    }

    /// All unresolved fields, in declaration order.
    pub fn unresolved_fields(&self) -> Vec<(QueryField, Unresolved)> {
        [
            QueryField::Age,
            QueryField::Gender,
            QueryField::Procedure,
            QueryField::Location,
            QueryField::PolicyDuration,
        ]
        .into_iter()
        .filter_map(|f| self.unresolved(f).map(|r| (f, r)))
        .collect()
    }

    /// Text handed to the embedder.
    ///
    /// The resolved procedure leads so that clause text about the same
    /// procedure ranks first; the raw query follows for everything else.
    pub fn embedding_text(&self) -> String {
        match self.procedure.value() {
            Some(procedure) => format!("{procedure}. {}", self.raw_text.trim()),
            None => self.raw_text.trim().to_string(),
        }
    }
}
