//! Spending category labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label of the fallback bucket for products no rule matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A spending category.
///
/// Categories are data (declared in the rule table), not a closed enum, so new
/// ones can be introduced without a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fallback category.
    pub fn uncategorized() -> Self {
        Self(UNCATEGORIZED.to_string())
    }

    pub fn is_uncategorized(&self) -> bool {
        self.0 == UNCATEGORIZED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::uncategorized()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
