//! Common types shared by the resolver, classifier and cache

use serde::Serialize;

/// Latest versions resolved for a package at three granularities
///
/// Each field holds either a version taken from the registry or, when no
/// qualifying candidate exists, the current version it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// The registry's `latest` dist-tag, taken as published
    pub latest_major: String,
    /// Newest candidate sharing the current major
    pub latest_minor: String,
    /// Newest candidate sharing the current major and minor
    pub latest_patch: String,
}

impl VersionInfo {
    /// A result that points every granularity back at `current`.
    pub fn unchanged(current: &str) -> Self {
        Self {
            latest_major: current.to_string(),
            latest_minor: current.to_string(),
            latest_patch: current.to_string(),
        }
    }
}

/// Registry metadata needed to resolve upgrades for one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryMetadata {
    /// Version the registry designates as `latest`
    pub latest_tag: String,
    /// Every published version string, in no particular order
    pub published_versions: Vec<String>,
}

impl RegistryMetadata {
    pub fn new(latest_tag: impl Into<String>, published_versions: Vec<String>) -> Self {
        Self {
            latest_tag: latest_tag.into(),
            published_versions,
        }
    }
}
