//! Upgrade tier classification

use serde::Serialize;

use crate::version::semver::parse_version;
use crate::version::types::VersionInfo;

/// Size of an available upgrade relative to the current version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeTier {
    None,
    Patch,
    Minor,
    Major,
}

impl UpgradeTier {
    /// Returns the string representation of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeTier::None => "none",
            UpgradeTier::Patch => "patch",
            UpgradeTier::Minor => "minor",
            UpgradeTier::Major => "major",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            UpgradeTier::None => "No",
            UpgradeTier::Patch => "Patch",
            UpgradeTier::Minor => "Minor",
            UpgradeTier::Major => "Major",
        }
    }
}

/// One available upgrade for a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeAnnouncement {
    pub tier: UpgradeTier,
    pub target_version: String,
}

impl UpgradeAnnouncement {
    pub fn new(tier: UpgradeTier, target_version: impl Into<String>) -> Self {
        Self {
            tier,
            target_version: target_version.into(),
        }
    }

    /// e.g. "Major upgrade available: 2.0.0"
    pub fn title(&self) -> String {
        format!(
            "{} upgrade available: {}",
            self.tier.label(),
            self.target_version
        )
    }

    /// e.g. "Upgrades lodash from 1.2.3 to 2.0.0"
    pub fn tooltip(&self, package_name: &str, current_version: &str) -> String {
        format!(
            "Upgrades {} from {} to {}",
            package_name, current_version, self.target_version
        )
    }

    /// Package manager invocation the host runs to apply this upgrade
    pub fn install_command(&self, package_name: &str) -> String {
        format!("npm install {}@{}", package_name, self.target_version)
    }
}

/// Decide which upgrades in `info` are actually newer than `current_version`
///
/// Returns announcements in fixed order: major, minor, patch. The three checks
/// are independent, so a dependency may get any combination of them. An empty
/// list means either up to date or unknown (some version failed to parse).
pub fn classify(current_version: &str, info: &VersionInfo) -> Vec<UpgradeAnnouncement> {
    let (Some(current), Some(major), Some(minor), Some(patch)) = (
        parse_version(current_version),
        parse_version(&info.latest_major),
        parse_version(&info.latest_minor),
        parse_version(&info.latest_patch),
    ) else {
        return Vec::new();
    };

    if current >= major {
        return Vec::new();
    }

    let mut announcements = Vec::new();

    if major.major > current.major {
        announcements.push(UpgradeAnnouncement::new(
            UpgradeTier::Major,
            &info.latest_major,
        ));
    }

    if minor.major == current.major && minor.minor > current.minor {
        announcements.push(UpgradeAnnouncement::new(
            UpgradeTier::Minor,
            &info.latest_minor,
        ));
    }

    if patch.major == current.major && patch.minor == current.minor && patch.patch > current.patch
    {
        announcements.push(UpgradeAnnouncement::new(
            UpgradeTier::Patch,
            &info.latest_patch,
        ));
    }

    announcements
}

/// Highest tier among `announcements`, `None` when empty
pub fn highest_tier(announcements: &[UpgradeAnnouncement]) -> UpgradeTier {
    announcements
        .iter()
        .map(|a| a.tier)
        .max()
        .unwrap_or(UpgradeTier::None)
}
