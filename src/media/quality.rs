use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque quality identifier (e.g. `1080p60`, `128k`).
///
/// The canonical string form is used both in wire messages and in on-disk
/// file names; equality is by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(String);

impl Quality {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Quality {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Quality {
    fn from(id: String) -> Self {
        Self(id)
    }
}
