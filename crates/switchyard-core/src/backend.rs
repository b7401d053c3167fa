use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a worker backend (e.g. `"claude"`, `"gemini"`).
///
/// Backend ids come from configuration and are compared verbatim; the
/// allow-list guard treats any id it was not configured with as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Create a backend id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BackendId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for BackendId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
