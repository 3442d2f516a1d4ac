use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

/// Matches the first caret or tilde range operator in a declared range.
static RANGE_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\^~]").expect("range operator pattern is valid"));

/// Parse a version string into a semver::Version, normalizing partial versions.
///
/// Handles partial versions like "1" or "1.2" by padding with zeros.
/// Does NOT strip range operators (use `clean_version` first if needed).
///
/// Examples:
/// - "1" -> Version(1, 0, 0)
/// - "1.2" -> Version(1, 2, 0)
/// - "1.2.3" -> Version(1, 2, 3)
pub fn parse_version(version: &str) -> Option<Version> {
    let parts: Vec<&str> = version.split('.').collect();
    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    };
    Version::parse(&normalized).ok()
}

/// Parse a registry version string strictly (full `major.minor.patch` required).
pub fn parse_strict(version: &str) -> Option<Version> {
    Version::parse(version).ok()
}

/// Strip the leading range operator from a declared range.
///
/// Only the first `^` or `~` is removed, so `^1.2.3` becomes `1.2.3` while
/// comparison ranges such as `>=1.2.3` are left untouched (and later fail to parse).
pub fn clean_version(declared_range: &str) -> String {
    RANGE_OPERATOR.replace(declared_range.trim(), "").into_owned()
}
