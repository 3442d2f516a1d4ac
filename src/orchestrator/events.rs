//! Pass results and the events pushed to subscribers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::parser::types::Dependency;
use crate::version::classifier::{UpgradeAnnouncement, classify};
use crate::version::semver::parse_version;
use crate::version::types::VersionInfo;

/// What a pass concluded about one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum DependencyOutcome {
    /// Newer releases exist, ordered major, minor, patch
    Upgrades(Vec<UpgradeAnnouncement>),
    UpToDate,
    /// The current or a resolved version is not semver
    Unknown,
    /// The registry lookup failed; carries the rendered error
    Failed(String),
    /// The pass was superseded before this dependency settled
    Cancelled,
}

impl DependencyOutcome {
    /// Classify `info` against `current_version`
    pub fn from_version_info(current_version: &str, info: &VersionInfo) -> Self {
        let announcements = classify(current_version, info);
        if !announcements.is_empty() {
            return DependencyOutcome::Upgrades(announcements);
        }

        let all_valid = [
            current_version,
            info.latest_major.as_str(),
            info.latest_minor.as_str(),
            info.latest_patch.as_str(),
        ]
        .iter()
        .all(|v| parse_version(v).is_some());

        if all_valid {
            DependencyOutcome::UpToDate
        } else {
            DependencyOutcome::Unknown
        }
    }

    /// One-line rendering for the host
    pub fn summary(&self) -> String {
        match self {
            DependencyOutcome::Upgrades(announcements) => announcements
                .iter()
                .map(UpgradeAnnouncement::title)
                .collect::<Vec<_>>()
                .join(", "),
            DependencyOutcome::UpToDate => "Up to date ✔︎".to_string(),
            DependencyOutcome::Unknown => "Unknown version".to_string(),
            DependencyOutcome::Failed(message) => format!("Failed: {}", message),
            DependencyOutcome::Cancelled => "Cancelled".to_string(),
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        matches!(
            self,
            DependencyOutcome::Upgrades(_)
                | DependencyOutcome::UpToDate
                | DependencyOutcome::Unknown
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub dependency: Dependency,
    pub outcome: DependencyOutcome,
}

/// Every dependency of one pass paired with its outcome, in dependency order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    scope: String,
    entries: Vec<ReportEntry>,
}

impl PassReport {
    pub(crate) fn new(scope: impl Into<String>, entries: Vec<ReportEntry>) -> Self {
        Self {
            scope: scope.into(),
            entries,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn outcome_of(&self, package_name: &str) -> Option<&DependencyOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.dependency.name == package_name)
            .map(|entry| &entry.outcome)
    }
}

/// Notifications delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// One dependency settled; emitted in completion order
    DependencyResolved {
        scope: String,
        dependency: Dependency,
        outcome: DependencyOutcome,
    },
    /// Every dependency of a pass settled
    PassCompleted {
        scope: String,
        resolved: usize,
        failed: usize,
        cancelled: usize,
    },
    /// Debounced hint that the scope's rendering is stale
    RefreshDisplay { scope: String },
}

pub type SubscriptionId = u64;

/// Receiving end of a subscription
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
}

/// Fan-out of [`PipelineEvent`]s to every live subscriber
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<PipelineEvent>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, mpsc::UnboundedSender<PipelineEvent>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push((id, tx));
        debug!("Subscriber {} registered", id);
        Subscription { id, events: rx }
    }

    /// Returns false when `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        before != subscribers.len()
    }

    /// Deliver `event` to every subscriber, dropping those whose receiver is gone
    pub fn emit(&self, event: PipelineEvent) {
        self.lock()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}
