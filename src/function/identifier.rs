//! Validated function names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a deployable function.
///
/// A valid identifier is exactly one non-empty path segment: it never
/// contains `/`, `\` or NUL, and is never `.` or `..`, so joining it onto the
/// functions root always yields a direct child of that root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionIdentifier(String);

/// Rejected function name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid function name '{0}'")]
pub struct InvalidIdentifier(pub String);

impl FunctionIdentifier {
    /// Validate a single path segment as a function name.
    pub fn parse(segment: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\', '\0']);

        if invalid {
            Err(InvalidIdentifier(segment.to_string()))
        } else {
            Ok(Self(segment.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FunctionIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FunctionIdentifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FunctionIdentifier> for String {
    fn from(id: FunctionIdentifier) -> Self {
        id.0
    }
}
