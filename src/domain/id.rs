//! Identifiers for records and reference kinds
//!
//! Legacy record ids are opaque strings (`"4711"`, `"res_12"`, ...). They are
//! trimmed on parse and must be non-empty and free of whitespace so they can
//! be embedded in link markers like `IRI:{id}:IRI`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid record ID: expected a non-empty token without whitespace, got '{0}'")]
    InvalidRecordId(String),

    #[error("Invalid reference kind: expected a non-empty property name, got '{0}'")]
    InvalidReferenceKind(String),
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Identifier of a migrated record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record ID, validating the format
    pub fn new(id: impl AsRef<str>) -> Result<Self, IdError> {
        id.as_ref().parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_token(s) {
            return Err(IdError::InvalidRecordId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RecordId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Name of the property a reference is stored under (e.g. `hasLinkTo`)
///
/// Cycle breaking works on one kind at a time, since swapping the direction
/// of a reference is only meaningful for kinds that are semantically
/// invertible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceKind(String);

impl ReferenceKind {
    pub fn new(name: impl AsRef<str>) -> Result<Self, IdError> {
        name.as_ref().parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferenceKind {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_token(s) {
            return Err(IdError::InvalidReferenceKind(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ReferenceKind {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceKind> for String {
    fn from(kind: ReferenceKind) -> Self {
        kind.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_parse_trims() {
        let id: RecordId = "  res_12 ".parse().unwrap();
        assert_eq!(id.as_str(), "res_12");
        assert_eq!(id.to_string(), "res_12");
    }

    #[test]
    fn record_id_rejects_empty_and_whitespace() {
        assert!(matches!(
            RecordId::new(""),
            Err(IdError::InvalidRecordId(_))
        ));
        assert!(matches!(
            RecordId::new("res 12"),
            Err(IdError::InvalidRecordId(_))
        ));
    }

    #[test]
    fn record_id_serde_validates() {
        let id: RecordId = serde_json::from_str("\"4711\"").unwrap();
        assert_eq!(id, RecordId::new("4711").unwrap());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"4711\"");

        let err = serde_json::from_str::<RecordId>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn reference_kind_parse() {
        let kind = ReferenceKind::new(":hasLinkTo").unwrap();
        assert_eq!(kind.as_str(), ":hasLinkTo");
        assert!(ReferenceKind::new("   ").is_err());
    }

    #[test]
    fn ids_order_lexically() {
        let mut ids = vec![
            RecordId::new("b").unwrap(),
            RecordId::new("a").unwrap(),
            RecordId::new("c").unwrap(),
        ];
        ids.sort();
        let names: Vec<_> = ids.iter().map(RecordId::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
