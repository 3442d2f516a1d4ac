//! Latest version resolution
//!
//! Turns raw registry metadata into a [`VersionInfo`]: the registry's own
//! `latest` designation plus the newest same-major and same-minor candidates
//! that survive the pre-release policy.

use std::sync::Arc;

use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PrereleasePolicy;
use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::semver::{parse_strict, parse_version};
use crate::version::types::{RegistryMetadata, VersionInfo};

/// Resolves [`VersionInfo`] for a package through a [`Registry`]
pub struct VersionResolver {
    registry: Arc<dyn Registry>,
}

impl VersionResolver {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Fetch registry metadata for `package_name` and resolve it against `current_version`
    ///
    /// Fetch errors are returned untouched so the queue can classify them.
    /// Returns `RegistryError::Cancelled` as soon as `cancel` fires; the
    /// abandoned request is dropped.
    pub async fn resolve(
        &self,
        package_name: &str,
        current_version: &str,
        policy: &PrereleasePolicy,
        cancel: &CancellationToken,
    ) -> Result<VersionInfo, RegistryError> {
        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RegistryError::Cancelled),
            result = self.registry.fetch_registry_metadata(package_name) => result?,
        };

        debug!(
            "Resolving {}@{} against {} published versions",
            package_name,
            current_version,
            metadata.published_versions.len()
        );

        Ok(compute_version_info(current_version, &metadata, policy))
    }
}

/// Compute the three latest versions for `current_version`
///
/// `latest_major` is the registry's `latest` tag as published, not filtered by
/// `policy`. When `current_version` does not parse, minor and patch fall back
/// to it unchanged.
pub fn compute_version_info(
    current_version: &str,
    metadata: &RegistryMetadata,
    policy: &PrereleasePolicy,
) -> VersionInfo {
    let latest_major = if metadata.latest_tag.is_empty() {
        current_version.to_string()
    } else {
        metadata.latest_tag.clone()
    };

    let Some(current) = parse_version(current_version) else {
        debug!("Current version {:?} is not semver", current_version);
        return VersionInfo {
            latest_major,
            latest_minor: current_version.to_string(),
            latest_patch: current_version.to_string(),
        };
    };

    let candidates = filter_candidates(&metadata.published_versions, &current, policy);

    let latest_minor = candidates
        .iter()
        .filter(|(_, v)| v.major == current.major)
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| current_version.to_string());

    let latest_patch = candidates
        .iter()
        .filter(|(_, v)| v.major == current.major && v.minor == current.minor)
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| current_version.to_string());

    VersionInfo {
        latest_major,
        latest_minor,
        latest_patch,
    }
}

/// Keep published versions that are allowed by `policy`, valid semver, and not older than `current`
pub fn filter_candidates<'a>(
    versions: &'a [String],
    current: &Version,
    policy: &PrereleasePolicy,
) -> Vec<(&'a str, Version)> {
    versions
        .iter()
        .filter(|v| policy.allows(v))
        .filter_map(|v| parse_strict(v).map(|parsed| (v.as_str(), parsed)))
        .filter(|(_, parsed)| {
            parsed.pre.is_empty() || PrereleasePolicy::is_known_channel(&parsed.pre)
        })
        .filter(|(_, parsed)| parsed >= current)
        .collect()
}
