//! Common types for parsers

use serde::Serialize;

use crate::version::semver::clean_version;

/// A dependency declared in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Package name (e.g., "lodash", "@types/node")
    pub name: String,
    /// Range exactly as declared (e.g., "^4.17.21")
    pub declared_range: String,
    /// `declared_range` with its range operator removed
    pub clean_version: String,
    /// Line number of the range string (0-indexed)
    pub line: usize,
    /// Column number of the range string, after the opening quote (0-indexed)
    pub column: usize,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        declared_range: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        let declared_range = declared_range.into();
        Self {
            name: name.into(),
            clean_version: clean_version(&declared_range),
            declared_range,
            line,
            column,
        }
    }
}
