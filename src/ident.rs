//! Canonical identifiers and identity resolution.
//!
//! Every stored entity is keyed by an [`Id`], a UUID newtype. Public engine
//! operations accept `impl IntoId`, so a caller may pass either the canonical
//! type (pass-through, infallible) or its string serialization (parsed,
//! failing with [`Error::InvalidIdentifier`]). Resolution happens once at the
//! top of each operation, before any query touches storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Canonical identifier for keywords, indexes, mentions and users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a string serialization into an [`Id`].
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidIdentifier(s.to_string()))
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Resolve a caller-supplied value into an [`Id`].
///
/// Implemented for the canonical type and for string serializations; each id
/// parameter of an operation resolves independently.
pub trait IntoId {
    fn into_id(self) -> Result<Id>;
}

impl IntoId for Id {
    fn into_id(self) -> Result<Id> {
        Ok(self)
    }
}

impl IntoId for &Id {
    fn into_id(self) -> Result<Id> {
        Ok(*self)
    }
}

impl IntoId for &str {
    fn into_id(self) -> Result<Id> {
        Id::parse(self)
    }
}

impl IntoId for String {
    fn into_id(self) -> Result<Id> {
        Id::parse(&self)
    }
}

impl IntoId for &String {
    fn into_id(self) -> Result<Id> {
        Id::parse(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let id = Id::new();
        let parsed = Id::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Id::parse("not-an-id").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_into_id_pass_through() {
        let id = Id::new();
        assert_eq!(id.into_id().unwrap(), id);
        assert_eq!((&id).into_id().unwrap(), id);
    }

    #[test]
    fn test_into_id_parses_strings() {
        let id = Id::new();
        let s = id.to_string();
        assert_eq!(s.as_str().into_id().unwrap(), id);
        assert_eq!(s.into_id().unwrap(), id);
    }
}
