//! Fetch orchestration
//!
//! A [`FetchOrchestrator`] runs resolution passes. A pass takes the
//! dependencies of one scope, answers what it can from the [`VersionCache`],
//! pushes the misses through the [`RequestQueue`] and classifies every result.
//! Starting a pass for a scope cancels the pass already running for that scope
//! and nothing else.
//!
//! - [`scope`]: per-scope pass tracking and content fingerprints
//! - [`events`]: outcomes, pass reports and subscriber fan-out
//! - [`notifier`]: debounced refresh notifications
//! - [`lifecycle`]: start-up and teardown of the background pieces

pub mod events;
pub mod lifecycle;
pub mod notifier;
pub mod scope;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::parser::types::Dependency;
use crate::queue::{QueueError, RequestQueue};
use crate::version::cache::VersionCache;
use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::resolver::VersionResolver;
use crate::version::types::VersionInfo;

pub use events::{
    DependencyOutcome, EventBus, PassReport, PipelineEvent, ReportEntry, Subscription,
    SubscriptionId,
};
pub use lifecycle::{Pipeline, PipelineHandle};
pub use notifier::RefreshNotifier;
pub use scope::ContentFingerprint;
use scope::ScopeState;

/// Input of one resolution pass
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub scope: String,
    pub dependencies: Vec<Dependency>,
    /// Content summary; a change since the previous pass drops the scope's cache entries
    pub fingerprint: Option<ContentFingerprint>,
}

impl ResolveRequest {
    pub fn new(scope: impl Into<String>, dependencies: Vec<Dependency>) -> Self {
        Self {
            scope: scope.into(),
            dependencies,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, revision: u64, content_len: usize) -> Self {
        self.fingerprint = Some(ContentFingerprint::new(revision, content_len));
        self
    }
}

pub struct FetchOrchestrator {
    cache: Arc<VersionCache>,
    queue: RequestQueue,
    resolver: Arc<VersionResolver>,
    config: RwLock<PipelineConfig>,
    scopes: Mutex<HashMap<String, ScopeState>>,
    events: Arc<EventBus>,
    notifier: Arc<RefreshNotifier>,
    root: CancellationToken,
    next_pass_id: AtomicU64,
}

impl FetchOrchestrator {
    pub fn new(config: PipelineConfig, registry: Arc<dyn Registry>) -> Self {
        let cache = Arc::new(VersionCache::from_config(&config.cache));
        Self::with_cache(config, registry, cache)
    }

    /// Build around an existing cache
    pub fn with_cache(
        config: PipelineConfig,
        registry: Arc<dyn Registry>,
        cache: Arc<VersionCache>,
    ) -> Self {
        let root = CancellationToken::new();
        let events = Arc::new(EventBus::new());
        let notifier = Arc::new(RefreshNotifier::new(
            Duration::from_millis(config.refresh_debounce_ms),
            Arc::clone(&events),
            root.child_token(),
        ));

        Self {
            cache,
            queue: RequestQueue::from_config(&config.queue),
            resolver: Arc::new(VersionResolver::new(registry)),
            config: RwLock::new(config),
            scopes: Mutex::new(HashMap::new()),
            events,
            notifier,
            root,
            next_pass_id: AtomicU64::new(0),
        }
    }

    fn lock_scopes(&self) -> MutexGuard<'_, HashMap<String, ScopeState>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache(&self) -> &Arc<VersionCache> {
        &self.cache
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Run one resolution pass for `request.scope`
    ///
    /// Per-dependency events are emitted as items settle; `PassCompleted` is
    /// emitted once all of them have, whatever their outcome. If the pass is
    /// superseded, its unsettled items report `Cancelled` and produce neither
    /// cache writes nor events.
    pub async fn resolve_scope(&self, request: ResolveRequest) -> PassReport {
        let ResolveRequest {
            scope,
            dependencies,
            fingerprint,
        } = request;

        let config = self.config();
        if !config.enabled {
            debug!("Pipeline disabled, skipping pass for {}", scope);
            self.events.emit(PipelineEvent::PassCompleted {
                scope: scope.clone(),
                resolved: 0,
                failed: 0,
                cancelled: 0,
            });
            return PassReport::new(scope, Vec::new());
        }

        let (pass_id, cancel) = self.begin_pass(&scope, fingerprint);
        info!(
            "Pass {} for {}: {} dependencies",
            pass_id,
            scope,
            dependencies.len()
        );

        let mut outcomes: Vec<Option<DependencyOutcome>> = vec![None; dependencies.len()];
        let mut pending = FuturesUnordered::new();

        for (index, dependency) in dependencies.iter().enumerate() {
            if let Some(info) = self
                .cache
                .get(&scope, &dependency.name, &dependency.clean_version)
            {
                debug!("Cache hit for {}@{}", dependency.name, dependency.clean_version);
                let _scopes = self.lock_scopes();
                let outcome = if cancel.is_cancelled() {
                    DependencyOutcome::Cancelled
                } else {
                    let outcome =
                        DependencyOutcome::from_version_info(&dependency.clean_version, &info);
                    self.publish(&scope, dependency, &outcome);
                    outcome
                };
                outcomes[index] = Some(outcome);
                continue;
            }

            let resolver = Arc::clone(&self.resolver);
            let name = dependency.name.clone();
            let version = dependency.clean_version.clone();
            let policy = config.prerelease;
            let work_cancel = cancel.clone();

            let task = self.queue.enqueue(
                move || {
                    let resolver = Arc::clone(&resolver);
                    let name = name.clone();
                    let version = version.clone();
                    let cancel = work_cancel.clone();
                    async move { resolver.resolve(&name, &version, &policy, &cancel).await }
                },
                Some(cancel.clone()),
            );
            pending.push(async move { (index, task.await) });
        }

        while let Some((index, result)) = pending.next().await {
            let dependency = &dependencies[index];
            outcomes[index] = Some(self.settle(&scope, dependency, result, &cancel));
        }

        self.finish_pass(&scope, pass_id);

        let entries: Vec<ReportEntry> = dependencies
            .into_iter()
            .zip(outcomes)
            .map(|(dependency, outcome)| ReportEntry {
                dependency,
                outcome: outcome.unwrap_or(DependencyOutcome::Cancelled),
            })
            .collect();

        let resolved = entries.iter().filter(|e| e.outcome.is_success()).count();
        let failed = entries
            .iter()
            .filter(|e| matches!(e.outcome, DependencyOutcome::Failed(_)))
            .count();
        let cancelled = entries.len() - resolved - failed;

        info!(
            "Pass {} for {} finished: {} resolved, {} failed, {} cancelled",
            pass_id, scope, resolved, failed, cancelled
        );
        self.events.emit(PipelineEvent::PassCompleted {
            scope: scope.clone(),
            resolved,
            failed,
            cancelled,
        });

        PassReport::new(scope, entries)
    }

    /// Register a new pass: supersede the running one and drop stale cache entries
    fn begin_pass(
        &self,
        scope: &str,
        fingerprint: Option<ContentFingerprint>,
    ) -> (u64, CancellationToken) {
        let pass_id = self.next_pass_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();

        let mut scopes = self.lock_scopes();
        let state = scopes.entry(scope.to_string()).or_default();

        if state.active.is_some() {
            debug!("Cancelling superseded pass for {}", scope);
        }
        state.replace_pass(pass_id, cancel.clone());

        if state.observe(fingerprint) {
            let removed = self.cache.invalidate_scope(scope);
            debug!("Content of {} changed, dropped {} cache entries", scope, removed);
        }

        (pass_id, cancel)
    }

    fn finish_pass(&self, scope: &str, pass_id: u64) {
        if let Some(state) = self.lock_scopes().get_mut(scope) {
            state.finish_pass(pass_id);
        }
    }

    /// Turn a queue result into an outcome, caching and publishing results of a live pass
    ///
    /// The scope table stays locked from the token check to the event, so a
    /// `begin_pass` on another thread either sees the write or cancels first.
    fn settle(
        &self,
        scope: &str,
        dependency: &Dependency,
        result: Result<VersionInfo, QueueError<RegistryError>>,
        cancel: &CancellationToken,
    ) -> DependencyOutcome {
        let _scopes = self.lock_scopes();
        if cancel.is_cancelled() {
            return DependencyOutcome::Cancelled;
        }

        let outcome = match result {
            Ok(info) => {
                self.cache.set(
                    scope,
                    &dependency.name,
                    &dependency.clean_version,
                    info.clone(),
                );
                DependencyOutcome::from_version_info(&dependency.clean_version, &info)
            }
            Err(QueueError::Cancelled)
            | Err(QueueError::Failed {
                source: RegistryError::Cancelled,
                ..
            }) => DependencyOutcome::Cancelled,
            Err(error) => {
                warn!("Failed to resolve {}: {}", dependency.name, error);
                DependencyOutcome::Failed(error.to_string())
            }
        };

        if !matches!(outcome, DependencyOutcome::Cancelled) {
            self.publish(scope, dependency, &outcome);
        }
        outcome
    }

    fn publish(&self, scope: &str, dependency: &Dependency, outcome: &DependencyOutcome) {
        self.events.emit(PipelineEvent::DependencyResolved {
            scope: scope.to_string(),
            dependency: dependency.clone(),
            outcome: outcome.clone(),
        });
        self.notifier.request(scope);
    }

    /// Drop every cached result for `scope` and ask the host to redraw it
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let removed = self.cache.invalidate_scope(scope);
        info!("Invalidated {} cache entries for {}", removed, scope);
        self.notifier.request(scope);
        removed
    }

    /// Forget `scope` entirely: cancel its pass, its cache entries and its fingerprint
    pub fn close_scope(&self, scope: &str) {
        if let Some(mut state) = self.lock_scopes().remove(scope) {
            state.cancel_active();
        }
        self.cache.invalidate_scope(scope);
        debug!("Closed scope {}", scope);
    }

    /// Swap in a new configuration and refresh every known scope
    ///
    /// Pre-release policy, `enabled` and the debounce interval apply from the
    /// next pass; queue and cache tuning stay as constructed.
    pub fn update_config(&self, config: PipelineConfig) {
        self.notifier
            .set_interval(Duration::from_millis(config.refresh_debounce_ms));
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;

        let scopes: Vec<String> = self.lock_scopes().keys().cloned().collect();
        info!("Configuration updated, refreshing {} scope(s)", scopes.len());
        for scope in scopes {
            self.notifier.request(&scope);
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Scopes with bookkeeping, i.e. resolved at least once and not closed
    pub fn known_scopes(&self) -> Vec<String> {
        self.lock_scopes().keys().cloned().collect()
    }

    /// Cancel every pass and reject every waiting request
    pub fn shutdown(&self) {
        info!("Shutting down fetch orchestrator");
        self.root.cancel();
        self.queue.abort_all();
    }

    pub(crate) fn root_token(&self) -> &CancellationToken {
        &self.root
    }
}
